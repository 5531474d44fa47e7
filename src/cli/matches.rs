use anyhow::{anyhow, Result};

use reunite::config::ReuniteConfig;
use reunite::matching::store::list_matches;
use reunite::matching::types::MatchStatus;

/// List recorded matches in the terminal.
pub fn matches(config: &ReuniteConfig, status: Option<&str>, limit: usize) -> Result<()> {
    let status = status
        .map(|s| s.parse::<MatchStatus>().map_err(|e| anyhow!(e)))
        .transpose()?;

    let db_path = config.resolved_db_path();
    let conn = reunite::db::open_database(&db_path)?;

    let records = list_matches(&conn, status, limit)?;
    if records.is_empty() {
        println!("No matches found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<20} {:<20} {:<10} {:<10} {:<12} {}",
        "ID", "Subject", "Counterpart", "Similarity", "Distance", "Status", "Created"
    );
    println!("{}", "-".repeat(140));
    for m in &records {
        println!(
            "{:<38} {:<20} {:<20} {:<10.4} {:<10} {:<12} {}",
            m.id,
            m.subject_id,
            m.counterpart_id,
            m.similarity,
            super::format_distance(m.distance_miles),
            m.status,
            m.created_at,
        );
    }

    Ok(())
}
