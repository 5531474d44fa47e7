//! `reunite doctor`: database diagnostics and a health report.

use anyhow::{Context, Result};

use reunite::config::ReuniteConfig;
use reunite::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &ReuniteConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `reunite import <file>` or `reunite serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("reunite Health Report");
    println!("=====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Thresholds:");
    println!("  Min similarity:  {}", config.matching.min_similarity);
    println!("  Max distance:    {} mi", config.matching.max_distance_miles);
    println!();
    println!("Row counts:");
    println!("  Subjects:        {}", report.subject_count);
    println!("  Embeddings:      {}", report.embedding_count);
    println!("  Matches:         {}", report.match_count);
    println!("  Audit log:       {}", report.log_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED");
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db ~/.reunite/reunite.db");
        println!("  2. Or re-import subjects into a fresh database:");
        println!("     reunite import subjects.json");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
