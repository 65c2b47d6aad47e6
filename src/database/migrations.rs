//! Versioned schema migrations.
//!
//! Applied migrations are recorded in `schema_version`; each runs once.

use rusqlite::Connection;

/// Bump when adding a migration.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Schema version recorded in the database (0 when nothing was applied).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

/// Runs every pending migration. Safe to call on each startup.
pub fn run_all(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY,
             applied_at INTEGER NOT NULL,
             description TEXT NOT NULL
         );",
    )?;

    let current = get_schema_version(conn);

    if current < 1 {
        migration_v1(conn)?;
        record_version(conn, 1, "Capture history")?;
    }

    if current < 2 {
        migration_v2(conn)?;
        record_version(conn, 2, "Add analysis columns to captures")?;
    }

    Ok(())
}

fn record_version(conn: &Connection, version: i32, description: &str) -> Result<(), rusqlite::Error> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
        rusqlite::params![version, now, description],
    )?;
    Ok(())
}

/// V1: one row per finished capture.
fn migration_v1(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS captures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            tab_id INTEGER,
            url TEXT,
            mime_type TEXT NOT NULL,
            width INTEGER NOT NULL,
            height INTEGER NOT NULL,
            image BLOB NOT NULL,
            captured_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_captures_captured_at ON captures(captured_at);
        ",
    )
}

/// V2: vision analysis text and error per capture.
fn migration_v2(conn: &Connection) -> Result<(), rusqlite::Error> {
    if conn.prepare("SELECT analysis FROM captures LIMIT 0").is_err() {
        conn.execute_batch("ALTER TABLE captures ADD COLUMN analysis TEXT;")?;
    }
    if conn.prepare("SELECT analysis_error FROM captures LIMIT 0").is_err() {
        conn.execute_batch("ALTER TABLE captures ADD COLUMN analysis_error TEXT;")?;
    }
    Ok(())
}
