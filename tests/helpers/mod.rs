#![allow(dead_code)]

use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use reunite::config::MatchingConfig;
use reunite::matching::fanout::Fanout;
use reunite::matching::kernel::EARTH_RADIUS_MILES;
use reunite::matching::pipeline::Pipeline;
use reunite::matching::store::{upsert_subject, SqliteStore};
use reunite::matching::types::{Coordinate, ResolutionState, SubjectRecord};
use reunite::notify::{
    DispatchError, MatchSummary, NotificationDispatcher, ReportGenerator, ReportOutcome,
};

const DIMS: usize = 8;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    reunite::db::open_memory_database().unwrap()
}

/// The unit vector every test embedding is measured against.
pub fn reference_embedding() -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[0] = 1.0;
    v
}

/// A unit vector whose cosine with [`reference_embedding`] is `cosine`.
pub fn embedding_at_cosine(cosine: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[0] = cosine;
    v[1] = (1.0 - cosine * cosine).max(0.0).sqrt();
    v
}

/// A point `miles` due north of `from`. Along a meridian the great-circle
/// distance is exactly the arc length.
pub fn offset_north(from: Coordinate, miles: f64) -> Coordinate {
    let dlat = (miles / EARTH_RADIUS_MILES).to_degrees();
    Coordinate::new(from.latitude + dlat, from.longitude).unwrap()
}

pub fn origin() -> Coordinate {
    Coordinate::new(40.0, -100.0).unwrap()
}

pub fn unresolved(id: &str, embeddings: Vec<Vec<f32>>, location: Option<Coordinate>) -> SubjectRecord {
    SubjectRecord {
        id: id.into(),
        state: ResolutionState::Unresolved,
        embeddings,
        location,
        contact: Some(serde_json::json!({ "email": format!("{id}@example.com") })),
    }
}

pub fn resolved(id: &str, embeddings: Vec<Vec<f32>>, location: Option<Coordinate>) -> SubjectRecord {
    SubjectRecord {
        id: id.into(),
        state: ResolutionState::Resolved,
        embeddings,
        location,
        contact: None,
    }
}

pub fn insert_subjects(conn: &mut Connection, subjects: &[SubjectRecord]) {
    for s in subjects {
        upsert_subject(conn, s).unwrap();
    }
}

pub fn matching_config() -> MatchingConfig {
    MatchingConfig {
        min_similarity: 0.85,
        max_distance_miles: 50.0,
        pool_size: 1000,
        batch_size: 50,
    }
}

/// Wire a pipeline over `store` with short downstream timeouts.
pub fn pipeline(
    store: &SqliteStore,
    dispatcher: Arc<dyn NotificationDispatcher>,
    reports: Arc<dyn ReportGenerator>,
) -> Pipeline {
    let store = Arc::new(store.clone());
    let fanout = Fanout::new(
        store.clone(),
        dispatcher,
        reports,
        Duration::from_millis(500),
        Duration::from_millis(500),
    );
    Pipeline::new(store.clone(), store, fanout, matching_config())
}

/// Records every dispatch. Fails for subjects listed in `fail_for`.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub calls: AtomicUsize,
    pub delivered: Mutex<Vec<String>>,
    fail_for: HashSet<String>,
}

impl RecordingDispatcher {
    pub fn failing_for(subject_ids: &[&str]) -> Self {
        Self {
            fail_for: subject_ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        _contact: &serde_json::Value,
        summary: &MatchSummary,
    ) -> Result<(), DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_for.contains(&summary.subject_id) {
            return Err(DispatchError::Transport("mailbox unavailable".into()));
        }
        self.delivered.lock().unwrap().push(summary.match_id.clone());
        Ok(())
    }
}

/// Parks every dispatch until released. `entered` fires when the first
/// dispatch starts.
#[derive(Default)]
pub struct GatedDispatcher {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl NotificationDispatcher for GatedDispatcher {
    async fn dispatch(
        &self,
        _contact: &serde_json::Value,
        _summary: &MatchSummary,
    ) -> Result<(), DispatchError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

pub struct FixedReports {
    pub success: bool,
    pub calls: AtomicUsize,
}

impl FixedReports {
    pub fn new(success: bool) -> Self {
        Self {
            success,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReportGenerator for FixedReports {
    async fn generate(&self, _match_id: &str) -> Result<ReportOutcome, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ReportOutcome {
            success: self.success,
            detail: None,
        })
    }
}
