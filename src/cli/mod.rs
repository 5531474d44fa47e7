pub mod doctor;
pub mod import;
pub mod matches;
pub mod scan;
pub mod serve;
pub mod stats;

use anyhow::Result;

use reunite::config::ReuniteConfig;
use reunite::matching::pipeline::Pipeline;
use reunite::matching::store::SqliteStore;
use reunite::notify;

/// Shared setup: open the DB and wire the pipeline with the configured
/// dispatcher and report generator.
pub fn build_pipeline(config: &ReuniteConfig) -> Result<Pipeline> {
    let db_path = config.resolved_db_path();
    let conn = reunite::db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let dispatcher = notify::create_dispatcher(&config.notify)?;
    let reports = notify::create_report_generator(&config.report)?;
    tracing::info!(
        notify = %config.notify.provider,
        report = %config.report.provider,
        "downstream adapters ready"
    );

    Ok(Pipeline::from_config(
        config,
        SqliteStore::new(conn),
        dispatcher,
        reports,
    ))
}

pub(crate) fn format_distance(distance_miles: Option<f64>) -> String {
    match distance_miles {
        Some(d) => format!("{d:.1} mi"),
        None => "unknown".into(),
    }
}
