//! SQL DDL for all reunite tables.
//!
//! Defines the `subjects`, `subject_embeddings`, `matches`, `match_log`, and
//! `schema_meta` tables. All DDL uses `IF NOT EXISTS` for idempotent
//! initialization. The pair-uniqueness index on `matches` is added by
//! migration v2 so that older databases pick it up too.

use rusqlite::Connection;

/// All schema DDL statements for reunite's core tables.
const SCHEMA_SQL: &str = r#"
-- Subject records (both unresolved subjects and the resolved counterpart pool)
CREATE TABLE IF NOT EXISTS subjects (
    id TEXT PRIMARY KEY,
    state TEXT NOT NULL CHECK(state IN ('unresolved','resolved')),
    latitude REAL,
    longitude REAL,
    contact TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subjects_state ON subjects(state);

-- Ordered embedding vectors, little-endian f32 blobs
CREATE TABLE IF NOT EXISTS subject_embeddings (
    subject_id TEXT NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
    ordinal INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    PRIMARY KEY (subject_id, ordinal)
);

-- Discovered matches
CREATE TABLE IF NOT EXISTS matches (
    id TEXT PRIMARY KEY,
    subject_id TEXT NOT NULL,
    counterpart_id TEXT NOT NULL,
    similarity REAL NOT NULL,
    distance_miles REAL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','notified','report_sent','failed')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_matches_subject ON matches(subject_id);
CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status);

-- Audit log
CREATE TABLE IF NOT EXISTS match_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('create','notify','notify_failed','report','report_failed')),
    match_id TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

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
