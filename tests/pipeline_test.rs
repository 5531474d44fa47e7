mod helpers;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use helpers::{
    embedding_at_cosine, insert_subjects, matching_config, offset_north, origin, pipeline,
    reference_embedding, resolved, test_db, unresolved, FixedReports, RecordingDispatcher,
};
use reunite::matching::fanout::Fanout;
use reunite::matching::pipeline::{CandidateOutcome, PassError, Pipeline};
use reunite::matching::store::{list_matches, MatchStore, RecordStore, SqliteStore, StoreError};
use reunite::matching::types::{
    Coordinate, MatchRecord, MatchStatus, NewMatch, ResolutionState, SubjectRecord,
};

fn audit_operations(store: &SqliteStore, match_id: &str) -> Vec<String> {
    let conn = store.connection();
    let conn = conn.lock().unwrap();
    let mut stmt = conn
        .prepare("SELECT operation FROM match_log WHERE match_id = ?1 ORDER BY id")
        .unwrap();
    stmt.query_map([match_id], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

#[tokio::test]
async fn close_similar_pair_produces_exactly_one_match() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-1", vec![reference_embedding()], Some(origin())),
            resolved(
                "found-1",
                vec![embedding_at_cosine(0.9)],
                Some(offset_north(origin(), 10.0)),
            ),
        ],
    );
    let store = SqliteStore::new(conn);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let pipeline = pipeline(&store, dispatcher.clone(), Arc::new(FixedReports::new(true)));

    let summary = pipeline.run_pass().await.unwrap();
    assert_eq!(summary.subjects_scanned, 1);
    assert_eq!(summary.comparisons, 1);
    assert_eq!(summary.matches_created, 1);

    let matches = {
        let conn = store.connection();
        let conn = conn.lock().unwrap();
        list_matches(&conn, None, 10).unwrap()
    };
    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert_eq!(m.subject_id, "lost-1");
    assert_eq!(m.counterpart_id, "found-1");
    assert!((m.similarity - 0.9).abs() < 1e-5, "similarity was {}", m.similarity);
    let distance = m.distance_miles.expect("distance should be known");
    assert!((distance - 10.0).abs() < 1e-3, "distance was {distance}");
    assert_eq!(m.status, MatchStatus::ReportSent);

    assert_eq!(dispatcher.delivered(), vec![m.id.clone()]);
    assert_eq!(
        audit_operations(&store, &m.id),
        vec!["create", "notify", "report"]
    );
}

#[tokio::test]
async fn distant_pair_produces_no_match() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-1", vec![reference_embedding()], Some(origin())),
            resolved(
                "found-1",
                vec![embedding_at_cosine(0.9)],
                Some(offset_north(origin(), 80.0)),
            ),
        ],
    );
    let store = SqliteStore::new(conn);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let pipeline = pipeline(&store, dispatcher.clone(), Arc::new(FixedReports::new(true)));

    let summary = pipeline.run_pass().await.unwrap();
    assert_eq!(summary.comparisons, 1);
    assert_eq!(summary.candidates, 0);
    assert_eq!(summary.matches_created, 0);
    assert_eq!(dispatcher.call_count(), 0);
}

#[tokio::test]
async fn subject_without_embeddings_is_never_compared() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-empty", vec![], Some(origin())),
            resolved("found-1", vec![reference_embedding()], Some(origin())),
        ],
    );
    let store = SqliteStore::new(conn);
    let pipeline = pipeline(
        &store,
        Arc::new(RecordingDispatcher::default()),
        Arc::new(FixedReports::new(true)),
    );

    let summary = pipeline.run_pass().await.unwrap();
    assert_eq!(summary.subjects_scanned, 0);
    assert_eq!(summary.comparisons, 0);
    assert_eq!(summary.matches_created, 0);
}

#[tokio::test]
async fn second_pass_records_nothing_new() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-1", vec![reference_embedding()], Some(origin())),
            resolved("found-1", vec![embedding_at_cosine(0.95)], Some(origin())),
            resolved(
                "found-2",
                vec![embedding_at_cosine(0.9)],
                Some(offset_north(origin(), 3.0)),
            ),
        ],
    );
    let store = SqliteStore::new(conn);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let pipeline = pipeline(&store, dispatcher.clone(), Arc::new(FixedReports::new(true)));

    let first = pipeline.run_pass().await.unwrap();
    assert_eq!(first.matches_created, 2);

    let second = pipeline.run_pass().await.unwrap();
    assert_eq!(second.matches_created, 0);
    assert_eq!(second.duplicates, 2);
    assert!(second
        .outcomes
        .iter()
        .all(|o| matches!(o.outcome, CandidateOutcome::AlreadyRecorded)));
    assert_eq!(dispatcher.call_count(), 2, "duplicates must not be re-notified");
}

#[tokio::test]
async fn candidates_are_processed_best_first() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-1", vec![reference_embedding()], Some(origin())),
            resolved("found-b", vec![embedding_at_cosine(0.9)], Some(origin())),
            resolved("found-a", vec![embedding_at_cosine(0.97)], Some(origin())),
            resolved("found-c", vec![embedding_at_cosine(0.5)], Some(origin())),
        ],
    );
    let store = SqliteStore::new(conn);
    let pipeline = pipeline(
        &store,
        Arc::new(RecordingDispatcher::default()),
        Arc::new(FixedReports::new(true)),
    );

    let summary = pipeline.run_pass().await.unwrap();
    let order: Vec<&str> = summary
        .outcomes
        .iter()
        .map(|o| o.counterpart_id.as_str())
        .collect();
    assert_eq!(order, vec!["found-a", "found-b"]);
    assert_eq!(summary.comparisons, 3);
}

#[tokio::test]
async fn best_pair_across_multiple_embeddings_counts() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved(
                "lost-1",
                vec![embedding_at_cosine(0.1), reference_embedding()],
                Some(origin()),
            ),
            resolved(
                "found-1",
                vec![embedding_at_cosine(-0.5), embedding_at_cosine(0.92)],
                Some(origin()),
            ),
        ],
    );
    let store = SqliteStore::new(conn);
    let pipeline = pipeline(
        &store,
        Arc::new(RecordingDispatcher::default()),
        Arc::new(FixedReports::new(true)),
    );

    let summary = pipeline.run_pass().await.unwrap();
    assert_eq!(summary.matches_created, 1);
    assert!((summary.outcomes[0].similarity - 0.92).abs() < 1e-5);
}

#[tokio::test]
async fn zero_coordinates_are_real_locations() {
    let null_island = Coordinate::new(0.0, 0.0).unwrap();
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-1", vec![reference_embedding()], Some(null_island)),
            resolved(
                "found-near",
                vec![reference_embedding()],
                Some(offset_north(null_island, 5.0)),
            ),
            resolved("found-nowhere", vec![reference_embedding()], None),
        ],
    );
    let store = SqliteStore::new(conn);
    let pipeline = pipeline(
        &store,
        Arc::new(RecordingDispatcher::default()),
        Arc::new(FixedReports::new(true)),
    );

    let summary = pipeline.run_pass().await.unwrap();
    assert_eq!(summary.matches_created, 1);
    assert_eq!(summary.outcomes[0].counterpart_id, "found-near");
    let distance = summary.outcomes[0].distance_miles.unwrap();
    assert!((distance - 5.0).abs() < 1e-3);
}

#[tokio::test]
async fn notify_failure_for_one_match_does_not_block_another() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-a", vec![reference_embedding()], Some(origin())),
            unresolved("lost-b", vec![reference_embedding()], Some(origin())),
            resolved("found-1", vec![embedding_at_cosine(0.95)], Some(origin())),
        ],
    );
    let store = SqliteStore::new(conn);
    let dispatcher = Arc::new(RecordingDispatcher::failing_for(&["lost-a"]));
    let pipeline = pipeline(&store, dispatcher.clone(), Arc::new(FixedReports::new(false)));

    let summary = pipeline.run_pass().await.unwrap();
    assert_eq!(summary.matches_created, 2);
    assert_eq!(summary.notify_failures, 1);
    assert_eq!(summary.report_failures, 2);
    assert_eq!(dispatcher.call_count(), 2);
    assert_eq!(dispatcher.delivered().len(), 1);

    let report_for = |subject: &str| {
        summary
            .outcomes
            .iter()
            .find(|o| o.subject_id == subject)
            .unwrap()
    };
    let CandidateOutcome::Matched { match_id: a_id, fanout } = &report_for("lost-a").outcome else {
        panic!("lost-a should have matched");
    };
    assert!(!fanout.notify_success());
    assert!(!fanout.report_success());
    let CandidateOutcome::Matched { fanout, .. } = &report_for("lost-b").outcome else {
        panic!("lost-b should have matched");
    };
    assert!(fanout.notify_success());

    assert_eq!(
        audit_operations(&store, a_id),
        vec!["create", "notify_failed", "report_failed"]
    );
    let failed = {
        let conn = store.connection();
        let conn = conn.lock().unwrap();
        list_matches(&conn, Some(MatchStatus::Failed), 10).unwrap()
    };
    assert_eq!(failed.len(), 2);
}

#[tokio::test]
async fn notify_failure_leaves_status_for_report_step() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-a", vec![reference_embedding()], Some(origin())),
            resolved("found-1", vec![embedding_at_cosine(0.95)], Some(origin())),
        ],
    );
    let store = SqliteStore::new(conn);
    let pipeline = pipeline(
        &store,
        Arc::new(RecordingDispatcher::failing_for(&["lost-a"])),
        Arc::new(FixedReports::new(true)),
    );

    let summary = pipeline.run_pass().await.unwrap();
    assert_eq!(summary.notify_failures, 1);
    assert_eq!(summary.report_failures, 0);

    let matches = {
        let conn = store.connection();
        let conn = conn.lock().unwrap();
        list_matches(&conn, None, 10).unwrap()
    };
    assert_eq!(matches[0].status, MatchStatus::ReportSent);
}

struct BrokenRecords;

#[async_trait]
impl RecordStore for BrokenRecords {
    async fn list_subjects(
        &self,
        _state: ResolutionState,
        _limit: usize,
    ) -> Result<Vec<SubjectRecord>, StoreError> {
        Err(StoreError::LockPoisoned)
    }

    async fn get_subject(&self, _id: &str) -> Result<Option<SubjectRecord>, StoreError> {
        Err(StoreError::LockPoisoned)
    }
}

#[tokio::test]
async fn unreadable_work_list_aborts_the_pass() {
    let store = Arc::new(SqliteStore::new(test_db()));
    let fanout = Fanout::new(
        store.clone(),
        Arc::new(RecordingDispatcher::default()),
        Arc::new(FixedReports::new(true)),
        Duration::from_millis(100),
        Duration::from_millis(100),
    );
    let pipeline = Pipeline::new(Arc::new(BrokenRecords), store, fanout, matching_config());

    let err = pipeline.run_pass().await.unwrap_err();
    assert!(matches!(err, PassError::ListSubjects(StoreError::LockPoisoned)));
}

/// Delegates to SQLite but refuses to insert matches for one counterpart.
struct RejectingInserts {
    inner: SqliteStore,
    reject_counterpart: &'static str,
}

#[async_trait]
impl MatchStore for RejectingInserts {
    async fn exists(&self, subject_id: &str, counterpart_id: &str) -> Result<bool, StoreError> {
        self.inner.exists(subject_id, counterpart_id).await
    }

    async fn insert(&self, new: &NewMatch) -> Result<Option<MatchRecord>, StoreError> {
        if new.counterpart_id == self.reject_counterpart {
            return Err(StoreError::Sqlite(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
                Some("database or disk is full".into()),
            )));
        }
        self.inner.insert(new).await
    }

    async fn update_status(
        &self,
        match_id: &str,
        status: MatchStatus,
        metadata: serde_json::Value,
    ) -> Result<bool, StoreError> {
        self.inner.update_status(match_id, status, metadata).await
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<MatchRecord>, StoreError> {
        self.inner.get_match(match_id).await
    }

    async fn log_event(
        &self,
        match_id: &str,
        operation: &str,
        details: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.inner.log_event(match_id, operation, details).await
    }
}

#[tokio::test]
async fn failed_insert_for_one_candidate_does_not_block_the_next() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-1", vec![reference_embedding()], Some(origin())),
            resolved("found-a", vec![embedding_at_cosine(0.97)], Some(origin())),
            resolved("found-b", vec![embedding_at_cosine(0.9)], Some(origin())),
        ],
    );
    let store = SqliteStore::new(conn);
    let matches = Arc::new(RejectingInserts {
        inner: store.clone(),
        reject_counterpart: "found-a",
    });
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let fanout = Fanout::new(
        matches.clone(),
        dispatcher.clone(),
        Arc::new(FixedReports::new(true)),
        Duration::from_millis(500),
        Duration::from_millis(500),
    );
    let pipeline = Pipeline::new(Arc::new(store.clone()), matches, fanout, matching_config());

    let summary = pipeline.run_pass().await.unwrap();
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.persist_failures, 1);
    assert_eq!(summary.matches_created, 1);

    assert_eq!(summary.outcomes[0].counterpart_id, "found-a");
    assert!(matches!(
        summary.outcomes[0].outcome,
        CandidateOutcome::PersistFailed { .. }
    ));
    assert_eq!(summary.outcomes[1].counterpart_id, "found-b");
    let CandidateOutcome::Matched { match_id, fanout } = &summary.outcomes[1].outcome else {
        panic!("found-b should have matched");
    };
    assert!(fanout.notify_success());
    assert_eq!(dispatcher.delivered(), vec![match_id.clone()]);

    let stored = {
        let conn = store.connection();
        let conn = conn.lock().unwrap();
        list_matches(&conn, None, 10).unwrap()
    };
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].counterpart_id, "found-b");
}

/// Serves the unresolved work list but cannot read the counterpart pool.
struct UnreadablePool {
    inner: SqliteStore,
}

#[async_trait]
impl RecordStore for UnreadablePool {
    async fn list_subjects(
        &self,
        state: ResolutionState,
        limit: usize,
    ) -> Result<Vec<SubjectRecord>, StoreError> {
        match state {
            ResolutionState::Resolved => Err(StoreError::LockPoisoned),
            ResolutionState::Unresolved => self.inner.list_subjects(state, limit).await,
        }
    }

    async fn get_subject(&self, id: &str) -> Result<Option<SubjectRecord>, StoreError> {
        self.inner.get_subject(id).await
    }
}

#[tokio::test]
async fn unreadable_pool_aborts_the_pass() {
    let mut conn = test_db();
    insert_subjects(
        &mut conn,
        &[
            unresolved("lost-1", vec![reference_embedding()], Some(origin())),
            resolved("found-1", vec![embedding_at_cosine(0.95)], Some(origin())),
        ],
    );
    let store = SqliteStore::new(conn);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let fanout = Fanout::new(
        Arc::new(store.clone()),
        dispatcher.clone(),
        Arc::new(FixedReports::new(true)),
        Duration::from_millis(100),
        Duration::from_millis(100),
    );
    let pipeline = Pipeline::new(
        Arc::new(UnreadablePool {
            inner: store.clone(),
        }),
        Arc::new(store.clone()),
        fanout,
        matching_config(),
    );

    let err = pipeline.run_pass().await.unwrap_err();
    assert!(matches!(err, PassError::LoadPool(StoreError::LockPoisoned)));
    assert_eq!(dispatcher.call_count(), 0);
}
