//! `reunite scan`: run one pass in the foreground.

use anyhow::Result;

use reunite::config::ReuniteConfig;
use reunite::matching::pipeline::CandidateOutcome;

/// Run exactly one pass and print what it did.
pub async fn scan(config: &ReuniteConfig, json: bool) -> Result<()> {
    let pipeline = super::build_pipeline(config)?;
    let summary = pipeline.run_pass().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Scan Summary");
    println!("{}", "=".repeat(40));
    println!("  Subjects scanned:    {}", summary.subjects_scanned);
    println!("  Subjects skipped:    {}", summary.subjects_skipped);
    println!("  Counterpart pool:    {}", summary.pool_size);
    println!("  Comparisons:         {}", summary.comparisons);
    println!("  Candidates:          {}", summary.candidates);
    println!("  New matches:         {}", summary.matches_created);
    println!("  Already recorded:    {}", summary.duplicates);
    println!("  Persist failures:    {}", summary.persist_failures);
    println!("  Notify failures:     {}", summary.notify_failures);
    println!("  Report failures:     {}", summary.report_failures);
    println!("  Elapsed:             {} ms", summary.elapsed_ms);

    let created: Vec<_> = summary
        .outcomes
        .iter()
        .filter_map(|r| match &r.outcome {
            CandidateOutcome::Matched { match_id, .. } => Some((r, match_id)),
            _ => None,
        })
        .collect();

    if !created.is_empty() {
        println!();
        println!(
            "{:<38} {:<20} {:<20} {:<10} {}",
            "Match", "Subject", "Counterpart", "Similarity", "Distance"
        );
        println!("{}", "-".repeat(100));
        for (report, match_id) in created {
            println!(
                "{:<38} {:<20} {:<20} {:<10.4} {}",
                match_id,
                report.subject_id,
                report.counterpart_id,
                report.similarity,
                super::format_distance(report.distance_miles),
            );
        }
    }

    Ok(())
}
