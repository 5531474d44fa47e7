use anyhow::Result;

use reunite::config::ReuniteConfig;

/// Display subject and match statistics in the terminal.
pub fn stats(config: &ReuniteConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = reunite::db::open_database(&db_path)?;

    let response = reunite::matching::stats::match_stats(&conn, Some(&db_path))?;

    println!("Match Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total subjects:      {}", response.total_subjects);
    println!("  Eligible (embedded): {}", response.eligible_subjects);
    println!();

    println!("Subjects by state:");
    for (state, count) in &response.subjects_by_state {
        println!("  {:<12} {}", state, count);
    }
    println!();

    println!("Matches by status:");
    for (status, count) in &response.matches_by_status {
        println!("  {:<12} {}", status, count);
    }
    println!();

    println!("Total matches:         {}", response.total_matches);
    println!("Database size:         {} bytes", response.db_size_bytes);

    if let Some(ref oldest) = response.oldest_match {
        println!("Oldest match:          {oldest}");
    }
    if let Some(ref newest) = response.newest_match {
        println!("Newest match:          {newest}");
    }

    Ok(())
}
