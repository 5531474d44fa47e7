use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::Path;

use reunite::config::ReuniteConfig;
use reunite::matching::store::upsert_subject;
use reunite::matching::types::SubjectRecord;

/// Import format.
#[derive(Debug, Deserialize)]
struct ImportData {
    subjects: Vec<SubjectRecord>,
}

/// Import subject records from a JSON file.
///
/// Existing records with the same ID are replaced, embeddings included.
/// A record that fails to store is reported and skipped.
pub fn import(config: &ReuniteConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;

    let data: ImportData = serde_json::from_str(&json).context("failed to parse import JSON")?;

    let db_path = config.resolved_db_path();
    let mut conn = reunite::db::open_database(&db_path)?;

    println!("Importing {} subjects...", data.subjects.len());

    let pb = ProgressBar::new(data.subjects.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len}")?
            .progress_chars("##-"),
    );

    let mut imported = 0u64;
    let mut without_embeddings = 0u64;
    let mut failed = 0u64;

    for subject in &data.subjects {
        match upsert_subject(&mut conn, subject) {
            Ok(()) => {
                imported += 1;
                if !subject.has_embeddings() {
                    without_embeddings += 1;
                }
            }
            Err(e) => {
                pb.println(format!("Warning: failed to import {}: {e}", subject.id));
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("Import complete:");
    println!("  Subjects imported:   {imported}");
    if without_embeddings > 0 {
        println!("  Without embeddings:  {without_embeddings} (not eligible for matching)");
    }
    if failed > 0 {
        println!("  Failed:              {failed}");
    }

    Ok(())
}
