use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            email               TEXT NOT NULL UNIQUE,
            password            TEXT NOT NULL,
            role                TEXT NOT NULL,
            is_verified         INTEGER NOT NULL DEFAULT 0,
            phone               TEXT,
            address             TEXT,
            profile_picture     TEXT,
            ngo_details         TEXT,
            volunteer_details   TEXT,
            affected_details    TEXT,
            vol_lon             REAL,
            vol_lat             REAL,
            vol_active          INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_role
            ON users(role, is_verified);

        CREATE INDEX IF NOT EXISTS idx_users_volunteer_location
            ON users(vol_lat, vol_lon) WHERE vol_active = 1;

        CREATE TABLE IF NOT EXISTS disasters (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            kind                TEXT NOT NULL,
            description         TEXT NOT NULL,
            severity            TEXT NOT NULL,
            start_date          TEXT NOT NULL,
            end_date            TEXT,
            is_active           INTEGER NOT NULL DEFAULT 1,
            affected_areas      TEXT NOT NULL DEFAULT '[]',
            alert_message       TEXT NOT NULL,
            created_by          TEXT REFERENCES users(id) ON DELETE SET NULL,
            updated_by          TEXT REFERENCES users(id) ON DELETE SET NULL,
            resources_needed    TEXT NOT NULL DEFAULT '[]',
            images              TEXT NOT NULL DEFAULT '[]',
            updates             TEXT NOT NULL DEFAULT '[]',
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_disasters_active
            ON disasters(is_active);

        CREATE TABLE IF NOT EXISTS resources (
            id              TEXT PRIMARY KEY,
            kind            TEXT NOT NULL,
            name            TEXT NOT NULL,
            description     TEXT NOT NULL,
            quantity        REAL NOT NULL CHECK (quantity >= 0),
            unit            TEXT NOT NULL,
            lon             REAL NOT NULL,
            lat             REAL NOT NULL,
            address         TEXT,
            provided_by     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            disaster_id     TEXT REFERENCES disasters(id) ON DELETE SET NULL,
            is_available    INTEGER NOT NULL DEFAULT 1,
            expiry_date     TEXT,
            images          TEXT NOT NULL DEFAULT '[]',
            status          TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_resources_location
            ON resources(lat, lon);

        CREATE INDEX IF NOT EXISTS idx_resources_provider
            ON resources(provided_by);

        CREATE TABLE IF NOT EXISTS resource_volunteers (
            resource_id     TEXT NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
            volunteer_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            position        INTEGER NOT NULL,
            PRIMARY KEY (resource_id, volunteer_id)
        );

        CREATE TABLE IF NOT EXISTS help_requests (
            id                  TEXT PRIMARY KEY,
            requested_by        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            disaster_id         TEXT REFERENCES disasters(id) ON DELETE SET NULL,
            request_types       TEXT NOT NULL,
            description         TEXT NOT NULL,
            urgency             TEXT NOT NULL,
            lon                 REAL NOT NULL,
            lat                 REAL NOT NULL,
            address             TEXT,
            number_of_people    INTEGER NOT NULL DEFAULT 1,
            status              TEXT NOT NULL,
            assigned_ngo        TEXT REFERENCES users(id) ON DELETE SET NULL,
            assigned_volunteer  TEXT REFERENCES users(id) ON DELETE SET NULL,
            images              TEXT NOT NULL DEFAULT '[]',
            updates             TEXT NOT NULL DEFAULT '[]',
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_help_requests_status
            ON help_requests(status);

        CREATE INDEX IF NOT EXISTS idx_help_requests_location
            ON help_requests(lat, lon);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
