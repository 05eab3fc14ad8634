use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use relief_types::models::{Location, Resource, ResourceStatus, ResourceType, UserRef};

use super::Near;
use crate::Database;
use crate::models::{
    get_disaster_ref, get_enum, get_json, get_opt_json, get_opt_ts, get_ts, get_uuid, json,
    opt_json, ts,
};

const RESOURCE_SELECT: &str = "SELECT r.id, r.kind, r.name, r.description, r.quantity, r.unit,
        r.lon, r.lat, r.address, r.provided_by, p.name,
        r.disaster_id, d.name, d.kind,
        r.is_available, r.expiry_date, r.images, r.status, r.created_at, r.updated_at
     FROM resources r
     LEFT JOIN users p ON p.id = r.provided_by
     LEFT JOIN disasters d ON d.id = r.disaster_id";

/// Which resources a listing should return.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceFilter {
    pub kind: Option<ResourceType>,
    pub provided_by: Option<Uuid>,
    pub available_only: bool,
}

impl ResourceFilter {
    fn where_clause(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(kind) = self.kind {
            values.push(kind.as_str().to_string());
            clauses.push(format!("r.kind = ?{}", values.len()));
        }
        if let Some(owner) = self.provided_by {
            values.push(owner.to_string());
            clauses.push(format!("r.provided_by = ?{}", values.len()));
        }
        if self.available_only {
            clauses.push("r.is_available = 1".to_string());
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

impl Database {
    pub fn insert_resource(&self, r: &Resource) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO resources (id, kind, name, description, quantity, unit, lon, lat,
                                        address, provided_by, disaster_id, is_available,
                                        expiry_date, images, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    r.id.to_string(),
                    r.kind.as_str(),
                    r.name,
                    r.description,
                    r.quantity,
                    r.unit,
                    r.location.longitude(),
                    r.location.latitude(),
                    opt_json(&r.location.address)?,
                    r.provided_by.id.to_string(),
                    r.disaster.as_ref().map(|d| d.id.to_string()),
                    r.is_available,
                    r.expiry_date.as_ref().map(ts),
                    json(&r.images)?,
                    r.status.as_str(),
                    ts(&r.created_at),
                    ts(&r.updated_at),
                ],
            )?;
            replace_volunteers(&tx, r.id, &r.assigned_volunteers)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Overwrites the owner-editable columns. Status and volunteers have their
    /// own operations; a delivered or depleted resource stays unavailable.
    pub fn save_resource(&self, r: &Resource) -> Result<Option<Resource>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE resources SET kind = ?2, name = ?3, description = ?4, quantity = ?5,
                        unit = ?6, lon = ?7, lat = ?8, address = ?9, disaster_id = ?10,
                        is_available = CASE WHEN status IN ('Delivered', 'Depleted') THEN 0
                                            ELSE ?11 END,
                        expiry_date = ?12, images = ?13, updated_at = ?14
                 WHERE id = ?1",
                params![
                    r.id.to_string(),
                    r.kind.as_str(),
                    r.name,
                    r.description,
                    r.quantity,
                    r.unit,
                    r.location.longitude(),
                    r.location.latitude(),
                    opt_json(&r.location.address)?,
                    r.disaster.as_ref().map(|d| d.id.to_string()),
                    r.is_available,
                    r.expiry_date.as_ref().map(ts),
                    json(&r.images)?,
                    ts(&Utc::now()),
                ],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_resource(conn, r.id)
        })
    }

    /// Replaces the assigned volunteers and puts the resource in transit.
    pub fn assign_resource_volunteers(
        &self,
        id: Uuid,
        volunteers: &[UserRef],
    ) -> Result<Option<Resource>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(status) = current_status(&tx, id)? else {
                return Ok(None);
            };
            if status != ResourceStatus::InTransit {
                status.transition(ResourceStatus::InTransit)?;
            }

            tx.execute(
                "UPDATE resources SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), ResourceStatus::InTransit.as_str(), ts(&Utc::now())],
            )?;
            replace_volunteers(&tx, id, volunteers)?;
            let stored = query_resource(&tx, id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Moves the resource to `next` if the stored status allows it. Terminal
    /// statuses also clear availability.
    pub fn set_resource_status(&self, id: Uuid, next: ResourceStatus) -> Result<Option<Resource>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(status) = current_status(&tx, id)? else {
                return Ok(None);
            };
            let next = status.transition(next)?;

            tx.execute(
                "UPDATE resources SET status = ?2, is_available = is_available AND ?3,
                        updated_at = ?4
                 WHERE id = ?1",
                params![id.to_string(), next.as_str(), next.keeps_available(), ts(&Utc::now())],
            )?;
            let stored = query_resource(&tx, id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    pub fn get_resource(&self, id: Uuid) -> Result<Option<Resource>> {
        self.with_conn(|conn| query_resource(conn, id))
    }

    pub fn list_resources(&self, filter: ResourceFilter) -> Result<Vec<Resource>> {
        self.with_conn(|conn| {
            let (clause, values) = filter.where_clause();
            let sql = format!("{RESOURCE_SELECT} {clause} ORDER BY r.created_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), resource_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            attach_volunteers(conn, &mut rows)?;
            Ok(rows)
        })
    }

    /// Returns false when no such resource exists.
    pub fn delete_resource(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM resources WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    /// Available resources within the radius, nearest first.
    pub fn nearby_resources(&self, near: Near, kind: Option<ResourceType>) -> Result<Vec<Resource>> {
        let bbox = near.bbox();
        let candidates = self.with_conn(|conn| {
            let mut sql = format!(
                "{RESOURCE_SELECT} WHERE r.is_available = 1
                   AND r.lat BETWEEN ?1 AND ?2 AND r.lon BETWEEN ?3 AND ?4"
            );
            let kind_str = kind.map(|k| k.as_str());
            let mut values: Vec<&dyn ToSql> =
                vec![&bbox.min_lat, &bbox.max_lat, &bbox.min_lon, &bbox.max_lon];
            if let Some(k) = &kind_str {
                sql.push_str(" AND r.kind = ?5");
                values.push(k);
            }
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(values.as_slice(), resource_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            attach_volunteers(conn, &mut rows)?;
            Ok(rows)
        })?;

        let located = candidates
            .into_iter()
            .map(|r| {
                let point = r.location.coordinates;
                (r, point)
            })
            .collect();
        Ok(near.rank(located))
    }
}

fn query_resource(conn: &Connection, id: Uuid) -> Result<Option<Resource>> {
    let sql = format!("{RESOURCE_SELECT} WHERE r.id = ?1");
    let Some(resource) = conn
        .query_row(&sql, [id.to_string()], resource_from_row)
        .optional()?
    else {
        return Ok(None);
    };
    let mut list = vec![resource];
    attach_volunteers(conn, &mut list)?;
    Ok(list.pop())
}

fn current_status(conn: &Connection, id: Uuid) -> Result<Option<ResourceStatus>> {
    let status = conn
        .query_row(
            "SELECT status FROM resources WHERE id = ?1",
            [id.to_string()],
            |row| get_enum(row, 0),
        )
        .optional()?;
    Ok(status)
}

fn replace_volunteers(conn: &Connection, resource_id: Uuid, volunteers: &[UserRef]) -> Result<()> {
    let id = resource_id.to_string();
    conn.execute("DELETE FROM resource_volunteers WHERE resource_id = ?1", [&id])?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO resource_volunteers (resource_id, volunteer_id, position)
         VALUES (?1, ?2, ?3)",
    )?;
    for (pos, volunteer) in volunteers.iter().enumerate() {
        stmt.execute(params![id, volunteer.id.to_string(), pos as i64])?;
    }
    Ok(())
}

/// Batch-fetch assigned volunteers for a set of resources.
fn attach_volunteers(conn: &Connection, resources: &mut [Resource]) -> Result<()> {
    if resources.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<String> = (1..=resources.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT rv.resource_id, u.id, u.name
         FROM resource_volunteers rv
         JOIN users u ON u.id = rv.volunteer_id
         WHERE rv.resource_id IN ({})
         ORDER BY rv.position",
        placeholders.join(", ")
    );
    let ids: Vec<String> = resources.iter().map(|r| r.id.to_string()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let pairs = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
            Ok((
                get_uuid(row, 0)?,
                UserRef { id: get_uuid(row, 1)?, name: row.get(2)?, phone: None },
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_resource: HashMap<Uuid, Vec<UserRef>> = HashMap::new();
    for (resource_id, volunteer) in pairs {
        by_resource.entry(resource_id).or_default().push(volunteer);
    }
    for r in resources.iter_mut() {
        r.assigned_volunteers = by_resource.remove(&r.id).unwrap_or_default();
    }
    Ok(())
}

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let provider_name: Option<String> = row.get(10)?;
    Ok(Resource {
        id: get_uuid(row, 0)?,
        kind: get_enum(row, 1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        quantity: row.get(4)?,
        unit: row.get(5)?,
        location: Location {
            address: get_opt_json(row, 8)?,
            ..Location::point(row.get(6)?, row.get(7)?)
        },
        provided_by: UserRef {
            id: get_uuid(row, 9)?,
            name: provider_name.unwrap_or_else(|| "unknown".to_string()),
            phone: None,
        },
        disaster: get_disaster_ref(row, 11)?,
        is_available: row.get(14)?,
        expiry_date: get_opt_ts(row, 15)?,
        images: get_json(row, 16)?,
        assigned_volunteers: Vec::new(),
        status: get_enum(row, 17)?,
        created_at: get_ts(row, 18)?,
        updated_at: get_ts(row, 19)?,
    })
}
