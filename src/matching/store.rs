//! Record and match persistence.
//!
//! [`RecordStore`] and [`MatchStore`] are the seams the pipeline talks to.
//! [`SqliteStore`] implements both over a shared `rusqlite` connection; the
//! synchronous free functions below do the actual SQL and are also used
//! directly by the CLI. Store reads normalize loosely-shaped rows (partial
//! coordinates, truncated blobs, unparseable contact JSON) into typed
//! records so nothing downstream has to.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::types::{
    Coordinate, MatchRecord, MatchStatus, NewMatch, ResolutionState, SubjectRecord,
};
use super::{bytes_to_embedding, embedding_to_bytes};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store: sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store: connection lock poisoned")]
    LockPoisoned,

    #[error("store: blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("store: match not found: {0}")]
    NotFound(String),

    #[error("store: malformed row {id}: {reason}")]
    Malformed { id: String, reason: String },
}

/// Read access to subject records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records in `state` that carry at least one embedding, newest first.
    async fn list_subjects(
        &self,
        state: ResolutionState,
        limit: usize,
    ) -> Result<Vec<SubjectRecord>, StoreError>;

    async fn get_subject(&self, id: &str) -> Result<Option<SubjectRecord>, StoreError>;
}

/// Persistence for discovered matches.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn exists(&self, subject_id: &str, counterpart_id: &str) -> Result<bool, StoreError>;

    /// Insert a `pending` match. `None` if the pair is already recorded.
    async fn insert(&self, new: &NewMatch) -> Result<Option<MatchRecord>, StoreError>;

    /// Advance status and merge `metadata` into the stored metadata object.
    /// Returns `false` (and changes nothing) if the move is not forward.
    async fn update_status(
        &self,
        match_id: &str,
        status: MatchStatus,
        metadata: serde_json::Value,
    ) -> Result<bool, StoreError>;

    async fn get_match(&self, match_id: &str) -> Result<Option<MatchRecord>, StoreError>;

    /// Append an audit entry without touching the match row.
    async fn log_event(
        &self,
        match_id: &str,
        operation: &str,
        details: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// SQLite-backed implementation of both store traits.
///
/// All SQL runs on the blocking pool so callers on the async runtime never
/// stall on disk I/O.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list_subjects(
        &self,
        state: ResolutionState,
        limit: usize,
    ) -> Result<Vec<SubjectRecord>, StoreError> {
        self.with_conn(move |conn| list_subjects(conn, state, limit))
            .await
    }

    async fn get_subject(&self, id: &str) -> Result<Option<SubjectRecord>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| get_subject(conn, &id)).await
    }
}

#[async_trait]
impl MatchStore for SqliteStore {
    async fn exists(&self, subject_id: &str, counterpart_id: &str) -> Result<bool, StoreError> {
        let (s, c) = (subject_id.to_string(), counterpart_id.to_string());
        self.with_conn(move |conn| match_exists(conn, &s, &c)).await
    }

    async fn insert(&self, new: &NewMatch) -> Result<Option<MatchRecord>, StoreError> {
        let new = new.clone();
        self.with_conn(move |conn| insert_match(conn, &new)).await
    }

    async fn update_status(
        &self,
        match_id: &str,
        status: MatchStatus,
        metadata: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let id = match_id.to_string();
        self.with_conn(move |conn| update_match_status(conn, &id, status, &metadata))
            .await
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<MatchRecord>, StoreError> {
        let id = match_id.to_string();
        self.with_conn(move |conn| get_match(conn, &id)).await
    }

    async fn log_event(
        &self,
        match_id: &str,
        operation: &str,
        details: serde_json::Value,
    ) -> Result<(), StoreError> {
        let (id, op) = (match_id.to_string(), operation.to_string());
        self.with_conn(move |conn| write_audit_log(conn, &op, &id, Some(&details)))
            .await
    }
}

// ── Subjects ─────────────────────────────────────────────────────────────────

struct SubjectRow {
    id: String,
    state: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    contact: Option<String>,
}

impl SubjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            state: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            contact: row.get(4)?,
        })
    }

    fn into_record(self, conn: &Connection) -> Result<SubjectRecord, StoreError> {
        let state = self
            .state
            .parse::<ResolutionState>()
            .map_err(|reason| StoreError::Malformed {
                id: self.id.clone(),
                reason,
            })?;

        let location = Coordinate::from_parts(self.latitude, self.longitude);
        if location.is_none() && (self.latitude.is_some() || self.longitude.is_some()) {
            tracing::warn!(subject_id = %self.id, "ignoring incomplete or out-of-range location");
        }

        let contact = self.contact.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(subject_id = %self.id, error = %e, "ignoring unparseable contact metadata");
                None
            }
        });

        let embeddings = load_embeddings(conn, &self.id)?;

        Ok(SubjectRecord {
            id: self.id,
            state,
            embeddings,
            location,
            contact,
        })
    }
}

const SUBJECT_COLUMNS: &str = "id, state, latitude, longitude, contact";

/// Records in `state` with at least one stored embedding, newest first.
pub fn list_subjects(
    conn: &Connection,
    state: ResolutionState,
    limit: usize,
) -> Result<Vec<SubjectRecord>, StoreError> {
    let rows: Vec<SubjectRow> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects s \
             WHERE s.state = ?1 \
               AND EXISTS (SELECT 1 FROM subject_embeddings e WHERE e.subject_id = s.id) \
             ORDER BY s.created_at DESC, s.id \
             LIMIT ?2"
        ))?;
        let collected = stmt
            .query_map(params![state.as_str(), limit as i64], SubjectRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        collected
    };

    rows.into_iter().map(|row| row.into_record(conn)).collect()
}

pub fn get_subject(conn: &Connection, id: &str) -> Result<Option<SubjectRecord>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?1"),
            params![id],
            SubjectRow::from_row,
        )
        .optional()?;
    row.map(|r| r.into_record(conn)).transpose()
}

/// Embeddings for one subject in ordinal order. Blobs that do not decode are
/// dropped with a warning.
fn load_embeddings(conn: &Connection, subject_id: &str) -> Result<Vec<Vec<f32>>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT ordinal, embedding FROM subject_embeddings WHERE subject_id = ?1 ORDER BY ordinal",
    )?;
    let blobs: Vec<(i64, Vec<u8>)> = stmt
        .query_map(params![subject_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut embeddings = Vec::with_capacity(blobs.len());
    for (ordinal, bytes) in blobs {
        match bytes_to_embedding(&bytes) {
            Some(v) if !v.is_empty() => embeddings.push(v),
            _ => tracing::warn!(
                subject_id,
                ordinal,
                len = bytes.len(),
                "dropping malformed embedding blob"
            ),
        }
    }
    Ok(embeddings)
}

/// Insert or replace a subject record together with its embeddings.
pub fn upsert_subject(conn: &mut Connection, record: &SubjectRecord) -> Result<(), StoreError> {
    let now = chrono::Utc::now().to_rfc3339();
    let contact_json = record.contact.as_ref().map(|c| c.to_string());
    let (latitude, longitude) = match record.location {
        Some(c) => (Some(c.latitude), Some(c.longitude)),
        None => (None, None),
    };

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO subjects (id, state, latitude, longitude, contact, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
         ON CONFLICT(id) DO UPDATE SET \
             state = excluded.state, \
             latitude = excluded.latitude, \
             longitude = excluded.longitude, \
             contact = excluded.contact, \
             updated_at = excluded.updated_at",
        params![
            record.id,
            record.state.as_str(),
            latitude,
            longitude,
            contact_json,
            now,
        ],
    )?;

    tx.execute(
        "DELETE FROM subject_embeddings WHERE subject_id = ?1",
        params![record.id],
    )?;
    for (ordinal, embedding) in record.embeddings.iter().enumerate() {
        tx.execute(
            "INSERT INTO subject_embeddings (subject_id, ordinal, embedding) VALUES (?1, ?2, ?3)",
            params![record.id, ordinal as i64, embedding_to_bytes(embedding)],
        )?;
    }

    tx.commit()?;
    Ok(())
}

// ── Matches ──────────────────────────────────────────────────────────────────

const MATCH_COLUMNS: &str =
    "id, subject_id, counterpart_id, similarity, distance_miles, status, created_at, updated_at, metadata";

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<MatchRecord> {
    let status: String = row.get(5)?;
    let status = status.parse::<MatchStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
    })?;
    let id: String = row.get(0)?;
    let metadata: Option<String> = row.get(8)?;
    let metadata = metadata.and_then(|raw| match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(match_id = %id, error = %e, "ignoring unparseable match metadata");
            None
        }
    });

    Ok(MatchRecord {
        id,
        subject_id: row.get(1)?,
        counterpart_id: row.get(2)?,
        similarity: row.get(3)?,
        distance_miles: row.get(4)?,
        status,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        metadata,
    })
}

pub fn match_exists(
    conn: &Connection,
    subject_id: &str,
    counterpart_id: &str,
) -> Result<bool, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM matches WHERE subject_id = ?1 AND counterpart_id = ?2",
        params![subject_id, counterpart_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert a new `pending` match and its `create` audit entry.
///
/// The pair index turns a concurrent duplicate into a no-op, reported as
/// `Ok(None)`.
pub fn insert_match(
    conn: &mut Connection,
    new: &NewMatch,
) -> Result<Option<MatchRecord>, StoreError> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let distance = new.distance_miles.is_finite().then_some(new.distance_miles);

    let tx = conn.transaction()?;
    let inserted = tx.execute(
        "INSERT INTO matches (id, subject_id, counterpart_id, similarity, distance_miles, status, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6) \
         ON CONFLICT(subject_id, counterpart_id) DO NOTHING",
        params![
            id,
            new.subject_id,
            new.counterpart_id,
            new.similarity,
            distance,
            now,
        ],
    )?;

    if inserted == 0 {
        return Ok(None);
    }

    write_audit_log(
        &tx,
        "create",
        &id,
        Some(&serde_json::json!({
            "subject_id": new.subject_id,
            "counterpart_id": new.counterpart_id,
            "similarity": new.similarity,
            "distance_miles": distance,
        })),
    )?;
    tx.commit()?;

    Ok(Some(MatchRecord {
        id,
        subject_id: new.subject_id.clone(),
        counterpart_id: new.counterpart_id.clone(),
        similarity: new.similarity,
        distance_miles: distance,
        status: MatchStatus::Pending,
        created_at: now.clone(),
        updated_at: now,
        metadata: None,
    }))
}

/// Move a match forward to `status`, merging `metadata` into the stored object.
pub fn update_match_status(
    conn: &mut Connection,
    match_id: &str,
    status: MatchStatus,
    metadata: &serde_json::Value,
) -> Result<bool, StoreError> {
    let tx = conn.transaction()?;

    let current = match tx
        .query_row(
            &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
            params![match_id],
            match_from_row,
        )
        .optional()?
    {
        Some(record) => record,
        None => return Err(StoreError::NotFound(match_id.to_string())),
    };

    if !current.status.can_advance_to(status) {
        tracing::debug!(
            match_id,
            from = %current.status,
            to = %status,
            "ignoring non-forward status change"
        );
        return Ok(false);
    }

    let merged = merge_metadata(current.metadata, metadata);
    tx.execute(
        "UPDATE matches SET status = ?1, metadata = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            status.as_str(),
            merged.to_string(),
            chrono::Utc::now().to_rfc3339(),
            match_id,
        ],
    )?;
    tx.commit()?;
    Ok(true)
}

fn merge_metadata(
    existing: Option<serde_json::Value>,
    update: &serde_json::Value,
) -> serde_json::Value {
    let mut merged = match existing {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    if let serde_json::Value::Object(fields) = update {
        for (key, value) in fields {
            merged.insert(key.clone(), value.clone());
        }
    }
    serde_json::Value::Object(merged)
}

pub fn get_match(conn: &Connection, match_id: &str) -> Result<Option<MatchRecord>, StoreError> {
    let record = conn
        .query_row(
            &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
            params![match_id],
            match_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Most recent matches first, optionally filtered by status.
pub fn list_matches(
    conn: &Connection,
    status: Option<MatchStatus>,
    limit: usize,
) -> Result<Vec<MatchRecord>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches \
         WHERE (?1 IS NULL OR status = ?1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT ?2"
    ))?;
    let records = stmt
        .query_map(
            params![status.map(|s| s.as_str()), limit as i64],
            match_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Write an entry to the match_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    match_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<(), StoreError> {
    let now = chrono::Utc::now().to_rfc3339();
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO match_log (operation, match_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, match_id, details_json, now],
    )?;
    Ok(())
}
