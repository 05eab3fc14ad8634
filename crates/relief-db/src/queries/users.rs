use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use uuid::Uuid;

use relief_types::models::{Location, Role, User, VolunteerDetails};

use super::Near;
use crate::{Database, Rejected};
use crate::models::{
    NewUser, VolunteerProfile, get_enum, get_opt_json, get_ts, get_uuid, opt_json, ts,
};

const USER_COLUMNS: &str = "id, name, email, role, is_verified, phone, address, profile_picture, \
     ngo_details, volunteer_details, affected_details, vol_lon, vol_lat, vol_active, \
     created_at, updated_at";

impl Database {
    /// Inserts an account. A duplicate email is reported as [`Rejected::EmailTaken`].
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        self.with_conn(|conn| insert_user(conn, new))
    }

    /// Self-service sign-up. The duplicate check, the first-admin rule and the
    /// insert run under one connection lock.
    pub fn register_user(&self, new: &NewUser) -> Result<User> {
        self.with_conn(|conn| {
            if email_exists(conn, &new.email)? {
                return Err(Rejected::EmailTaken.into());
            }
            if new.role == Role::Admin && count_role(conn, Role::Admin)? > 0 {
                return Err(Rejected::AdminRegistrationClosed.into());
            }
            insert_user(conn, new)
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    /// User plus stored password hash, for login.
    pub fn get_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS}, password FROM users WHERE email = ?1");
            let row = conn
                .query_row(&sql, [email], |row| Ok((user_from_row(row)?, row.get(16)?)))
                .optional()?;
            Ok(row)
        })
    }

    pub fn email_taken(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| email_exists(conn, email))
    }

    pub fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        self.with_conn(|conn| match role {
            Some(role) => query_users(
                conn,
                "WHERE role = ?1 ORDER BY created_at DESC",
                &[&role.as_str()],
            ),
            None => query_users(conn, "ORDER BY created_at DESC", &[]),
        })
    }

    /// NGO and volunteer accounts still waiting for an admin.
    pub fn list_unverified_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                "WHERE is_verified = 0 AND role IN ('NGO', 'Volunteer') ORDER BY created_at",
                &[],
            )
        })
    }

    /// Returns false when no such user exists.
    pub fn set_user_verified(&self, id: Uuid, verified: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET is_verified = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), verified, ts(&Utc::now())],
            )?;
            Ok(n > 0)
        })
    }

    /// Returns false when no such user exists.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    /// Persists the editable profile fields of `user`.
    pub fn save_profile(&self, user: &User) -> Result<()> {
        let volunteer = user.volunteer_details.as_ref().map(|v| VolunteerProfile {
            skills: v.skills.clone(),
            availability: v.availability,
        });
        let active = user.volunteer_details.as_ref().is_some_and(|v| v.is_active);

        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET name = ?2, phone = ?3, address = ?4, profile_picture = ?5,
                        ngo_details = ?6, volunteer_details = ?7, affected_details = ?8,
                        vol_active = ?9, updated_at = ?10
                 WHERE id = ?1",
                params![
                    user.id.to_string(),
                    user.name,
                    user.phone,
                    opt_json(&user.address)?,
                    opt_json(&user.ngo_details)?,
                    opt_json(&volunteer)?,
                    opt_json(&user.affected_details)?,
                    active,
                    ts(&Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    /// Records a volunteer's position and marks them active.
    pub fn update_volunteer_location(&self, id: Uuid, coordinates: [f64; 2]) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET vol_lon = ?2, vol_lat = ?3, vol_active = 1, updated_at = ?4
                 WHERE id = ?1 AND role = 'Volunteer'",
                params![id.to_string(), coordinates[0], coordinates[1], ts(&Utc::now())],
            )?;
            Ok(n > 0)
        })
    }

    /// Verified, active volunteers within the radius, nearest first.
    pub fn nearby_volunteers(&self, near: Near) -> Result<Vec<User>> {
        let bbox = near.bbox();
        let candidates = self.with_conn(|conn| {
            query_users(
                conn,
                "WHERE role = 'Volunteer' AND is_verified = 1 AND vol_active = 1
                   AND vol_lat BETWEEN ?1 AND ?2 AND vol_lon BETWEEN ?3 AND ?4",
                &[&bbox.min_lat, &bbox.max_lat, &bbox.min_lon, &bbox.max_lon],
            )
        })?;

        let located = candidates
            .into_iter()
            .filter_map(|u| {
                let point = u
                    .volunteer_details
                    .as_ref()
                    .and_then(|v| v.current_location.as_ref())
                    .map(|l| l.coordinates)?;
                Some((u, point))
            })
            .collect();
        Ok(near.rank(located))
    }
}

fn insert_user(conn: &Connection, new: &NewUser) -> Result<User> {
    let now = ts(&Utc::now());
    let volunteer = (new.role == Role::Volunteer).then(|| VolunteerProfile {
        skills: new.skills.clone(),
        availability: new.availability,
    });

    let inserted = conn.execute(
        "INSERT INTO users (id, name, email, password, role, is_verified, phone, address,
                            ngo_details, volunteer_details, affected_details,
                            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            new.id.to_string(),
            new.name,
            new.email,
            new.password_hash,
            new.role.as_str(),
            new.is_verified,
            new.phone,
            opt_json(&new.address)?,
            opt_json(&new.ngo_details)?,
            opt_json(&volunteer)?,
            opt_json(&new.affected_details)?,
            now,
        ],
    );
    match inserted {
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            return Err(Rejected::EmailTaken.into());
        }
        other => {
            other?;
        }
    }

    query_user(conn, new.id)?.ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", new.id))
}

fn email_exists(conn: &Connection, email: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM users WHERE email = ?1", [email], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn count_role(conn: &Connection, role: Role) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        [role.as_str()],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

fn query_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let user = conn.query_row(&sql, [id.to_string()], user_from_row).optional()?;
    Ok(user)
}

fn query_users(
    conn: &Connection,
    tail: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: Role = get_enum(row, 3)?;

    let volunteer_details = if role == Role::Volunteer {
        let profile: VolunteerProfile = get_opt_json(row, 9)?.unwrap_or_default();
        let lon: Option<f64> = row.get(11)?;
        let lat: Option<f64> = row.get(12)?;
        Some(VolunteerDetails {
            skills: profile.skills,
            availability: profile.availability,
            current_location: lon.zip(lat).map(|(lon, lat)| Location::point(lon, lat)),
            is_active: row.get(13)?,
        })
    } else {
        None
    };

    Ok(User {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role,
        is_verified: row.get(4)?,
        phone: row.get(5)?,
        address: get_opt_json(row, 6)?,
        profile_picture: row.get(7)?,
        ngo_details: get_opt_json(row, 8)?,
        volunteer_details,
        affected_details: get_opt_json(row, 10)?,
        created_at: get_ts(row, 14)?,
        updated_at: get_ts(row, 15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::new_user;

    #[test]
    fn create_and_fetch_user() {
        let db = Database::open_in_memory().unwrap();
        let new = new_user("ngo@example.com", Role::Ngo, false);
        let created = db.create_user(&new).unwrap();

        assert_eq!(created.email, "ngo@example.com");
        assert!(!created.is_verified);
        assert!(created.volunteer_details.is_none());

        let (user, hash) = db.get_credentials("ngo@example.com").unwrap().unwrap();
        assert_eq!(user.id, new.id);
        assert_eq!(hash, "hash");
        assert!(db.email_taken("ngo@example.com").unwrap());
        assert!(!db.email_taken("other@example.com").unwrap());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("dup@example.com", Role::Volunteer, false)).unwrap();
        let err = db.create_user(&new_user("dup@example.com", Role::Ngo, false)).unwrap_err();
        assert_eq!(err.downcast_ref::<Rejected>(), Some(&Rejected::EmailTaken));
    }

    #[test]
    fn registration_closes_admin_signup_after_the_first() {
        let db = Database::open_in_memory().unwrap();
        db.register_user(&new_user("root@example.com", Role::Admin, true)).unwrap();

        let err = db.register_user(&new_user("second@example.com", Role::Admin, true)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<Rejected>(),
            Some(&Rejected::AdminRegistrationClosed)
        );

        let err = db.register_user(&new_user("root@example.com", Role::Volunteer, false)).unwrap_err();
        assert_eq!(err.downcast_ref::<Rejected>(), Some(&Rejected::EmailTaken));
        assert_eq!(db.list_users(None).unwrap().len(), 1);
    }

    #[test]
    fn unverified_lists_only_ngos_and_volunteers() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("a@example.com", Role::AffectedIndividual, false)).unwrap();
        let ngo = db.create_user(&new_user("n@example.com", Role::Ngo, false)).unwrap();
        db.create_user(&new_user("v@example.com", Role::Volunteer, true)).unwrap();

        let pending = db.list_unverified_users().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, ngo.id);

        assert!(db.set_user_verified(ngo.id, true).unwrap());
        assert!(db.list_unverified_users().unwrap().is_empty());
        assert!(!db.set_user_verified(Uuid::new_v4(), true).unwrap());
    }

    #[test]
    fn nearby_volunteers_filters_and_orders() {
        let db = Database::open_in_memory().unwrap();
        let near = db.create_user(&new_user("near@example.com", Role::Volunteer, true)).unwrap();
        let far = db.create_user(&new_user("far@example.com", Role::Volunteer, true)).unwrap();
        let unverified = db.create_user(&new_user("new@example.com", Role::Volunteer, false)).unwrap();
        let idle = db.create_user(&new_user("idle@example.com", Role::Volunteer, true)).unwrap();

        db.update_volunteer_location(near.id, [72.880, 19.080]).unwrap();
        db.update_volunteer_location(far.id, [72.920, 19.100]).unwrap();
        db.update_volunteer_location(unverified.id, [72.878, 19.076]).unwrap();

        let found = db.nearby_volunteers(Near::new([72.8777, 19.0760], 10_000.0)).unwrap();
        let ids: Vec<Uuid> = found.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![near.id, far.id]);
        assert!(!ids.contains(&idle.id));

        let loc = found[0].volunteer_details.as_ref().unwrap();
        assert!(loc.is_active);
        assert_eq!(loc.current_location.as_ref().unwrap().coordinates, [72.880, 19.080]);
    }

    #[test]
    fn location_update_ignores_non_volunteers() {
        let db = Database::open_in_memory().unwrap();
        let ngo = db.create_user(&new_user("n@example.com", Role::Ngo, true)).unwrap();
        assert!(!db.update_volunteer_location(ngo.id, [1.0, 1.0]).unwrap());
    }

    #[test]
    fn save_profile_round_trips_details() {
        let db = Database::open_in_memory().unwrap();
        let mut user = db.create_user(&new_user("v@example.com", Role::Volunteer, true)).unwrap();
        let details = user.volunteer_details.as_mut().unwrap();
        details.skills = vec!["First Aid".into()];
        details.is_active = true;
        user.name = "Renamed".into();
        db.save_profile(&user).unwrap();

        let stored = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        let details = stored.volunteer_details.unwrap();
        assert_eq!(details.skills, vec!["First Aid".to_string()]);
        assert!(details.is_active);
    }
}
