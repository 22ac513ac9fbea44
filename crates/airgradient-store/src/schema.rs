//! Database schema.

use rusqlite::Connection;

use airgradient_types::SensorField;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Descriptive columns, in select order after `timestamp, samples`.
pub(crate) const INFO_COLUMNS: [&str; 6] = [
    "serialno",
    "led_mode",
    "firmware",
    "model",
    "boot",
    "boot_count",
];

/// Initialize the database schema.
///
/// Creates the tables in a fresh database. Any version other than the
/// current one is refused rather than guessed at.
pub fn initialize(conn: &Connection) -> Result<()> {
    match get_schema_version(conn)? {
        0 => {
            create_schema_v1(conn)?;
            set_schema_version(conn, SCHEMA_VERSION)
        }
        SCHEMA_VERSION => Ok(()),
        found => Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
    }
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Quoted column list for every numeric sensor field.
pub(crate) fn sensor_columns() -> Vec<String> {
    SensorField::ALL
        .iter()
        .map(|f| format!("\"{}\"", f.key()))
        .collect()
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    let sensor_defs: Vec<String> = sensor_columns()
        .into_iter()
        .map(|col| format!("    {} REAL,", col))
        .collect();

    // `timestamp` is the rowid alias, so range scans walk the primary index.
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS archive (
            timestamp INTEGER PRIMARY KEY,
            samples INTEGER NOT NULL,
        {}
            serialno TEXT,
            led_mode TEXT,
            firmware TEXT,
            model TEXT,
            boot INTEGER,
            boot_count INTEGER
        );
        "#,
        sensor_defs.join("\n        ")
    );

    conn.execute_batch(&sql)?;
    Ok(())
}
