use anyhow::Result;
use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use relief_types::models::{
    Assignment, HelpRequest, HelpRequestStatus, Location, RequestType, UpdateEntry, UserRef,
};

use super::Near;
use crate::{Database, Rejected};
use crate::models::{
    get_disaster_ref, get_enum, get_json, get_opt_json, get_ts, get_user_ref, get_uuid, json,
    opt_json, ts,
};

const HELP_REQUEST_SELECT: &str = "SELECT h.id, h.requested_by, ru.name, ru.phone,
        h.disaster_id, d.name, d.kind,
        h.request_types, h.description, h.urgency, h.lon, h.lat, h.address,
        h.number_of_people, h.status,
        h.assigned_ngo, nu.name, h.assigned_volunteer, vu.name,
        h.images, h.updates, h.created_at, h.updated_at
     FROM help_requests h
     LEFT JOIN users ru ON ru.id = h.requested_by
     LEFT JOIN disasters d ON d.id = h.disaster_id
     LEFT JOIN users nu ON nu.id = h.assigned_ngo
     LEFT JOIN users vu ON vu.id = h.assigned_volunteer";

#[derive(Debug, Default, Clone, Copy)]
pub struct HelpRequestFilter {
    pub status: Option<HelpRequestStatus>,
    /// Matches requests whose type list contains this type.
    pub kind: Option<RequestType>,
}

impl Database {
    pub fn insert_help_request(&self, h: &HelpRequest) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO help_requests (id, requested_by, disaster_id, request_types,
                                            description, urgency, lon, lat, address,
                                            number_of_people, status, assigned_ngo,
                                            assigned_volunteer, images, updates,
                                            created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    h.id.to_string(),
                    h.requested_by.id.to_string(),
                    h.disaster.as_ref().map(|d| d.id.to_string()),
                    json(&h.request_type)?,
                    h.description,
                    h.urgency.as_str(),
                    h.location.longitude(),
                    h.location.latitude(),
                    opt_json(&h.location.address)?,
                    h.number_of_people,
                    h.status.as_str(),
                    h.assigned_to.ngo.as_ref().map(|u| u.id.to_string()),
                    h.assigned_to.volunteer.as_ref().map(|u| u.id.to_string()),
                    json(&h.images)?,
                    json(&h.updates)?,
                    ts(&h.created_at),
                    ts(&h.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Writes the requester-editable columns, provided the request is still editable
    /// when the write happens. `None` when the request does not exist.
    pub fn edit_help_request(&self, h: &HelpRequest) -> Result<Option<HelpRequest>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(status) = current_status(&tx, h.id)? else {
                return Ok(None);
            };
            if !status.is_editable() {
                return Err(Rejected::NotEditable(status).into());
            }

            tx.execute(
                "UPDATE help_requests SET disaster_id = ?2, request_types = ?3, description = ?4,
                        urgency = ?5, lon = ?6, lat = ?7, address = ?8, number_of_people = ?9,
                        images = ?10, updated_at = ?11
                 WHERE id = ?1",
                params![
                    h.id.to_string(),
                    h.disaster.as_ref().map(|d| d.id.to_string()),
                    json(&h.request_type)?,
                    h.description,
                    h.urgency.as_str(),
                    h.location.longitude(),
                    h.location.latitude(),
                    opt_json(&h.location.address)?,
                    h.number_of_people,
                    json(&h.images)?,
                    ts(&Utc::now()),
                ],
            )?;
            let stored = query_help_request(&tx, h.id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Moves the request to `next` if the stored status allows it, optionally
    /// logging `note`. The check and the write share one lock, so of two
    /// racing transitions out of the same state only the first succeeds.
    pub fn set_help_request_status(
        &self,
        id: Uuid,
        next: HelpRequestStatus,
        note: Option<&UpdateEntry>,
    ) -> Result<Option<HelpRequest>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(status) = current_status(&tx, id)? else {
                return Ok(None);
            };
            let next = status.transition(next)?;

            tx.execute(
                "UPDATE help_requests SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), next.as_str(), ts(&Utc::now())],
            )?;
            if let Some(note) = note {
                push_update(&tx, id, note)?;
            }
            let stored = query_help_request(&tx, id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Sets the given assignees (keeping any not given), moves the request to
    /// Assigned and logs `note`.
    pub fn assign_help_request(
        &self,
        id: Uuid,
        ngo: Option<Uuid>,
        volunteer: Option<Uuid>,
        note: &UpdateEntry,
    ) -> Result<Option<HelpRequest>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(status) = current_status(&tx, id)? else {
                return Ok(None);
            };
            if !status.accepts_assignment() {
                return Err(Rejected::NotAssignable(status).into());
            }
            if status != HelpRequestStatus::Assigned {
                status.transition(HelpRequestStatus::Assigned)?;
            }

            tx.execute(
                "UPDATE help_requests
                 SET assigned_ngo = COALESCE(?2, assigned_ngo),
                     assigned_volunteer = COALESCE(?3, assigned_volunteer),
                     status = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    ngo.map(|u| u.to_string()),
                    volunteer.map(|u| u.to_string()),
                    HelpRequestStatus::Assigned.as_str(),
                    ts(&Utc::now()),
                ],
            )?;
            push_update(&tx, id, note)?;
            let stored = query_help_request(&tx, id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Appends to the updates log in place. `None` when the request does not exist.
    pub fn append_help_request_update(
        &self,
        id: Uuid,
        note: &UpdateEntry,
    ) -> Result<Option<HelpRequest>> {
        self.with_conn(|conn| {
            if !push_update(conn, id, note)? {
                return Ok(None);
            }
            query_help_request(conn, id)
        })
    }

    pub fn get_help_request(&self, id: Uuid) -> Result<Option<HelpRequest>> {
        self.with_conn(|conn| query_help_request(conn, id))
    }

    pub fn list_help_requests(&self, filter: HelpRequestFilter) -> Result<Vec<HelpRequest>> {
        self.with_conn(|conn| {
            let status = filter.status.map(|s| s.as_str());
            let kind = filter.kind.map(|k| k.as_str());

            let mut clauses = Vec::new();
            let mut values: Vec<&dyn ToSql> = Vec::new();
            if let Some(s) = &status {
                values.push(s);
                clauses.push(format!("h.status = ?{}", values.len()));
            }
            if let Some(k) = &kind {
                values.push(k);
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM json_each(h.request_types) WHERE value = ?{})",
                    values.len()
                ));
            }
            let tail = if clauses.is_empty() {
                "ORDER BY h.created_at DESC".to_string()
            } else {
                format!("WHERE {} ORDER BY h.created_at DESC", clauses.join(" AND "))
            };
            query_help_requests(conn, &tail, &values)
        })
    }

    /// Requests assigned to the given NGO or volunteer, newest first.
    pub fn list_assigned_help_requests(&self, user_id: Uuid) -> Result<Vec<HelpRequest>> {
        self.with_conn(|conn| {
            query_help_requests(
                conn,
                "WHERE h.assigned_ngo = ?1 OR h.assigned_volunteer = ?1 ORDER BY h.created_at DESC",
                &[&user_id.to_string()],
            )
        })
    }

    /// Requests raised by the given user, newest first.
    pub fn list_help_requests_by(&self, requester: Uuid) -> Result<Vec<HelpRequest>> {
        self.with_conn(|conn| {
            query_help_requests(
                conn,
                "WHERE h.requested_by = ?1 ORDER BY h.created_at DESC",
                &[&requester.to_string()],
            )
        })
    }

    /// Still-open requests (pending or assigned) within the radius, nearest first.
    pub fn nearby_help_requests(&self, near: Near) -> Result<Vec<HelpRequest>> {
        let bbox = near.bbox();
        let candidates = self.with_conn(|conn| {
            query_help_requests(
                conn,
                "WHERE h.status IN ('Pending', 'Assigned')
                   AND h.lat BETWEEN ?1 AND ?2 AND h.lon BETWEEN ?3 AND ?4",
                &[&bbox.min_lat, &bbox.max_lat, &bbox.min_lon, &bbox.max_lon],
            )
        })?;

        let located = candidates
            .into_iter()
            .map(|h| {
                let point = h.location.coordinates;
                (h, point)
            })
            .collect();
        Ok(near.rank(located))
    }
}

fn query_help_request(conn: &Connection, id: Uuid) -> Result<Option<HelpRequest>> {
    let sql = format!("{HELP_REQUEST_SELECT} WHERE h.id = ?1");
    let h = conn
        .query_row(&sql, [id.to_string()], help_request_from_row)
        .optional()?;
    Ok(h)
}

fn current_status(conn: &Connection, id: Uuid) -> Result<Option<HelpRequestStatus>> {
    let status = conn
        .query_row(
            "SELECT status FROM help_requests WHERE id = ?1",
            [id.to_string()],
            |row| get_enum(row, 0),
        )
        .optional()?;
    Ok(status)
}

/// Appends one entry to the JSON updates array without rewriting the rest.
fn push_update(conn: &Connection, id: Uuid, note: &UpdateEntry) -> Result<bool> {
    let n = conn.execute(
        "UPDATE help_requests SET updates = json_insert(updates, '$[#]', json(?2)), updated_at = ?3
         WHERE id = ?1",
        params![id.to_string(), json(note)?, ts(&Utc::now())],
    )?;
    Ok(n > 0)
}

fn query_help_requests(
    conn: &Connection,
    tail: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<HelpRequest>> {
    let sql = format!("{HELP_REQUEST_SELECT} {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, help_request_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn help_request_from_row(row: &Row<'_>) -> rusqlite::Result<HelpRequest> {
    let requester_name: Option<String> = row.get(2)?;
    Ok(HelpRequest {
        id: get_uuid(row, 0)?,
        requested_by: UserRef {
            id: get_uuid(row, 1)?,
            name: requester_name.unwrap_or_else(|| "unknown".to_string()),
            phone: row.get(3)?,
        },
        disaster: get_disaster_ref(row, 4)?,
        request_type: get_json(row, 7)?,
        description: row.get(8)?,
        urgency: get_enum(row, 9)?,
        location: Location {
            address: get_opt_json(row, 12)?,
            ..Location::point(row.get(10)?, row.get(11)?)
        },
        number_of_people: row.get(13)?,
        status: get_enum(row, 14)?,
        assigned_to: Assignment {
            ngo: get_user_ref(row, 15, 16)?,
            volunteer: get_user_ref(row, 17, 18)?,
        },
        images: get_json(row, 19)?,
        updates: get_json(row, 20)?,
        created_at: get_ts(row, 21)?,
        updated_at: get_ts(row, 22)?,
    })
}
