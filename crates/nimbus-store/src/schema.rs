//! Database schema.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        // Fresh database
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        info!("Created schema v{}", SCHEMA_VERSION);
    }

    Ok(())
}

/// Get the current schema version.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Whether a table with this name exists.
pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Latest snapshot per location query
        CREATE TABLE IF NOT EXISTS current_weather (
            id TEXT PRIMARY KEY,
            location_query TEXT NOT NULL UNIQUE,
            location_name TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            weather_data TEXT NOT NULL
        );

        -- One snapshot per (date, location query)
        CREATE TABLE IF NOT EXISTS historical_weather (
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            location_query TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            weather_data TEXT NOT NULL,
            UNIQUE(date, location_query)
        );
        CREATE INDEX IF NOT EXISTS idx_historical_query_date
            ON historical_weather(location_query, date);
        CREATE INDEX IF NOT EXISTS idx_historical_timestamp
            ON historical_weather(timestamp);

        CREATE TABLE IF NOT EXISTS saved_locations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            query TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            latitude REAL,
            longitude REAL,
            position INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    Ok(())
}
