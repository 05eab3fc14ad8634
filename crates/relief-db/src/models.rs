//! Column codecs shared by the query modules.
//!
//! Rows map straight onto the relief-types models. Nested documents are
//! stored as JSON text, enums by their wire names, timestamps as RFC 3339.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use relief_types::models::{
    AffectedDetails, Address, Availability, DisasterRef, NgoDetails, Role, UserRef,
};

/// Everything needed to insert a user row.
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub ngo_details: Option<NgoDetails>,
    pub skills: Vec<String>,
    pub availability: Option<Availability>,
    pub affected_details: Option<AffectedDetails>,
}

/// Stored part of a volunteer's details. Location and the active flag live
/// in their own columns so the nearby search can filter on them.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct VolunteerProfile {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub availability: Option<Availability>,
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, e))).transpose()
}

pub(crate) fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_opt_json<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    Ok(parse_ts(&raw))
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().map(parse_ts))
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's own datetime() has no timezone; treat it as UTC.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

/// Populated user reference from an `(id, name)` pair of a LEFT JOIN.
pub(crate) fn get_user_ref(
    row: &Row<'_>,
    id_idx: usize,
    name_idx: usize,
) -> rusqlite::Result<Option<UserRef>> {
    let Some(id) = get_opt_uuid(row, id_idx)? else {
        return Ok(None);
    };
    let name: Option<String> = row.get(name_idx)?;
    Ok(Some(UserRef {
        id,
        name: name.unwrap_or_else(|| "unknown".to_string()),
        phone: None,
    }))
}

/// Populated disaster reference from an `(id, name, kind)` triple of a LEFT JOIN.
pub(crate) fn get_disaster_ref(
    row: &Row<'_>,
    id_idx: usize,
) -> rusqlite::Result<Option<DisasterRef>> {
    let Some(id) = get_opt_uuid(row, id_idx)? else {
        return Ok(None);
    };
    let name: Option<String> = row.get(id_idx + 1)?;
    let kind: Option<String> = row.get(id_idx + 2)?;
    match (name, kind) {
        (Some(name), Some(kind)) => Ok(Some(DisasterRef {
            id,
            name,
            kind: kind.parse().map_err(|e| conversion_error(id_idx + 2, e))?,
        })),
        _ => Ok(None),
    }
}

pub(crate) fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn opt_json<T: Serialize>(value: &Option<T>) -> anyhow::Result<Option<String>> {
    value.as_ref().map(|v| json(v)).transpose()
}
