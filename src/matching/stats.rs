use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::types::{MatchStatus, ResolutionState};

/// Aggregate counts for operators.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_subjects: u64,
    pub subjects_by_state: BTreeMap<String, u64>,
    /// Subjects with at least one embedding, i.e. eligible for scanning.
    pub eligible_subjects: u64,
    pub total_matches: u64,
    pub matches_by_status: BTreeMap<String, u64>,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_match: Option<String>,
}

/// Compute store statistics. `db_path` is used for file size; pass `None`
/// for in-memory databases.
pub fn match_stats(conn: &Connection, db_path: Option<&Path>) -> Result<StatsResponse> {
    let subjects_by_state = count_grouped(
        conn,
        "SELECT state, COUNT(*) FROM subjects GROUP BY state",
        &[ResolutionState::Unresolved.as_str(), ResolutionState::Resolved.as_str()],
    )?;
    let matches_by_status = count_grouped(
        conn,
        "SELECT status, COUNT(*) FROM matches GROUP BY status",
        &MatchStatus::ALL.map(|s| s.as_str()),
    )?;

    let eligible: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT subject_id) FROM subject_embeddings",
        [],
        |row| row.get(0),
    )?;
    let (oldest_match, newest_match): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(created_at), MAX(created_at) FROM matches",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_subjects: subjects_by_state.values().sum(),
        subjects_by_state,
        eligible_subjects: eligible as u64,
        total_matches: matches_by_status.values().sum(),
        matches_by_status,
        db_size_bytes,
        oldest_match,
        newest_match,
    })
}

/// Run a `SELECT key, COUNT(*) ... GROUP BY key` query, seeding every known
/// key with zero.
fn count_grouped(conn: &Connection, sql: &str, keys: &[&str]) -> Result<BTreeMap<String, u64>> {
    let mut map: BTreeMap<String, u64> = keys.iter().map(|k| (k.to_string(), 0)).collect();

    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    for (key, count) in rows {
        map.insert(key, count as u64);
    }
    Ok(map)
}
