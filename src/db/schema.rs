//! SQL DDL for the memorial tables.
//!
//! Defines `memorials`, `audit_log`, and `schema_meta`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization; later columns arrive through
//! [`super::migrations`].

use rusqlite::Connection;

/// Version 1 of the schema. `images` and `sources` hold JSON arrays of
/// `{url, title}` objects.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS memorials (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK(length(trim(name)) > 0),
    date_of_birth TEXT,
    date_of_death TEXT NOT NULL,
    age INTEGER CHECK(age IS NULL OR age >= 0),
    place_of_birth TEXT,
    place_of_death TEXT,
    nationality TEXT,
    story TEXT NOT NULL DEFAULT '',
    sources TEXT NOT NULL DEFAULT '[]',
    images TEXT NOT NULL DEFAULT '[]',
    primary_image_url TEXT,
    user_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memorials_name ON memorials(name);
CREATE INDEX IF NOT EXISTS idx_memorials_user ON memorials(user_id);

-- Audit log
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('create','update','reclaim')),
    subject TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_subject ON audit_log(subject);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
