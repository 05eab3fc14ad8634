use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use relief_types::geo;
use relief_types::models::{Disaster, UpdateEntry};

use super::Near;
use crate::Database;
use crate::models::{get_enum, get_json, get_opt_ts, get_ts, get_user_ref, get_uuid, json, ts};

const DISASTER_SELECT: &str = "SELECT d.id, d.name, d.kind, d.description, d.severity,
        d.start_date, d.end_date, d.is_active, d.affected_areas, d.alert_message,
        d.created_by, cu.name, d.updated_by, uu.name,
        d.resources_needed, d.images, d.updates, d.created_at, d.updated_at
     FROM disasters d
     LEFT JOIN users cu ON cu.id = d.created_by
     LEFT JOIN users uu ON uu.id = d.updated_by";

impl Database {
    pub fn insert_disaster(&self, d: &Disaster) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO disasters (id, name, kind, description, severity, start_date, end_date,
                                        is_active, affected_areas, alert_message, created_by,
                                        updated_by, resources_needed, images, updates,
                                        created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    d.id.to_string(),
                    d.name,
                    d.kind.as_str(),
                    d.description,
                    d.severity.as_str(),
                    ts(&d.start_date),
                    d.end_date.as_ref().map(ts),
                    d.is_active,
                    json(&d.affected_areas)?,
                    d.alert_message,
                    d.created_by.as_ref().map(|u| u.id.to_string()),
                    d.updated_by.as_ref().map(|u| u.id.to_string()),
                    json(&d.resources_needed)?,
                    json(&d.images)?,
                    json(&d.updates)?,
                    ts(&d.created_at),
                    ts(&d.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Overwrites the editable columns of an existing disaster. The updates log
    /// is only ever appended to, see [`Database::append_disaster_update`].
    pub fn save_disaster(&self, d: &Disaster) -> Result<Option<Disaster>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE disasters SET name = ?2, kind = ?3, description = ?4, severity = ?5,
                        start_date = ?6, end_date = ?7, is_active = ?8, affected_areas = ?9,
                        alert_message = ?10, updated_by = ?11, resources_needed = ?12,
                        images = ?13, updated_at = ?14
                 WHERE id = ?1",
                params![
                    d.id.to_string(),
                    d.name,
                    d.kind.as_str(),
                    d.description,
                    d.severity.as_str(),
                    ts(&d.start_date),
                    d.end_date.as_ref().map(ts),
                    d.is_active,
                    json(&d.affected_areas)?,
                    d.alert_message,
                    d.updated_by.as_ref().map(|u| u.id.to_string()),
                    json(&d.resources_needed)?,
                    json(&d.images)?,
                    ts(&d.updated_at),
                ],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_disaster(conn, d.id)
        })
    }

    /// Appends to the updates log in place. `None` when the disaster does not exist.
    pub fn append_disaster_update(
        &self,
        id: Uuid,
        note: &UpdateEntry,
        updated_by: Uuid,
    ) -> Result<Option<Disaster>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE disasters SET updates = json_insert(updates, '$[#]', json(?2)),
                        updated_by = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![id.to_string(), json(note)?, updated_by.to_string(), ts(&Utc::now())],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_disaster(conn, id)
        })
    }

    pub fn set_disaster_alert(
        &self,
        id: Uuid,
        message: &str,
        updated_by: Uuid,
    ) -> Result<Option<Disaster>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE disasters SET alert_message = ?2, updated_by = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![id.to_string(), message, updated_by.to_string(), ts(&Utc::now())],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_disaster(conn, id)
        })
    }

    pub fn get_disaster(&self, id: Uuid) -> Result<Option<Disaster>> {
        self.with_conn(|conn| query_disaster(conn, id))
    }

    pub fn list_disasters(&self, active_only: bool) -> Result<Vec<Disaster>> {
        self.with_conn(|conn| {
            let tail = if active_only {
                "WHERE d.is_active = 1 ORDER BY d.start_date DESC"
            } else {
                "ORDER BY d.start_date DESC"
            };
            query_disasters(conn, tail)
        })
    }

    /// Returns false when no such disaster exists.
    pub fn delete_disaster(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM disasters WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    /// Active disasters with an affected area covering the centre point.
    /// Polygons must contain it; point areas must lie within the radius.
    pub fn disasters_covering(&self, near: Near) -> Result<Vec<Disaster>> {
        let active = self.list_disasters(true)?;
        Ok(active
            .into_iter()
            .filter(|d| {
                d.affected_areas
                    .iter()
                    .any(|a| geo::area_covers(a, near.center, near.radius_m))
            })
            .collect())
    }
}

fn query_disaster(conn: &Connection, id: Uuid) -> Result<Option<Disaster>> {
    let sql = format!("{DISASTER_SELECT} WHERE d.id = ?1");
    let d = conn.query_row(&sql, [id.to_string()], disaster_from_row).optional()?;
    Ok(d)
}

fn query_disasters(conn: &Connection, tail: &str) -> Result<Vec<Disaster>> {
    let sql = format!("{DISASTER_SELECT} {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], disaster_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn disaster_from_row(row: &Row<'_>) -> rusqlite::Result<Disaster> {
    Ok(Disaster {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        kind: get_enum(row, 2)?,
        description: row.get(3)?,
        severity: get_enum(row, 4)?,
        start_date: get_ts(row, 5)?,
        end_date: get_opt_ts(row, 6)?,
        is_active: row.get(7)?,
        affected_areas: get_json(row, 8)?,
        alert_message: row.get(9)?,
        created_by: get_user_ref(row, 10, 11)?,
        updated_by: get_user_ref(row, 12, 13)?,
        resources_needed: get_json(row, 14)?,
        images: get_json(row, 15)?,
        updates: get_json(row, 16)?,
        created_at: get_ts(row, 17)?,
        updated_at: get_ts(row, 18)?,
    })
}
