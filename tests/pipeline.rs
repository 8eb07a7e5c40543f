use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use face_attendance::config::{Mode, PipelineConfig};
use face_attendance::ledger::InMemoryLedger;
use face_attendance::matcher::{MatcherClient, MatcherError};
use face_attendance::model::{
    Enrollment, FailureKind, ImageEvent, MatchCandidate, OutcomeKind, OutcomeStatus, RejectReason,
    Terminal,
};
use face_attendance::pipeline::Pipeline;
use face_attendance::reporter::{report, report_batch};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Answers per object key; unknown keys have no match. Enrolled faces are
/// kept in `collection` until discarded.
#[derive(Default)]
struct ScriptedMatcher {
    answers: HashMap<String, Result<Option<MatchCandidate>, MatcherError>>,
    enroll_confidence: Option<f32>,
    collection: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl ScriptedMatcher {
    fn with(mut self, key: &str, answer: Result<Option<MatchCandidate>, MatcherError>) -> Self {
        self.answers.insert(key.to_string(), answer);
        self
    }

    fn enrolling_at(mut self, confidence: f32) -> Self {
        self.enroll_confidence = Some(confidence);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn collection(&self) -> HashSet<String> {
        self.collection.lock().unwrap().clone()
    }
}

#[async_trait]
impl MatcherClient for ScriptedMatcher {
    async fn resolve(&self, event: &ImageEvent) -> Result<Option<MatchCandidate>, MatcherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .get(&event.object_key)
            .cloned()
            .unwrap_or(Ok(None))
    }

    async fn enroll(
        &self,
        event: &ImageEvent,
        _identity_id: &str,
    ) -> Result<Option<Enrollment>, MatcherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let face_record_id = format!("face-{}", event.object_key);
        self.collection.lock().unwrap().insert(face_record_id.clone());

        Ok(Some(Enrollment {
            face_record_id,
            confidence: self.enroll_confidence.unwrap_or(99.9),
            bounding_box: None,
        }))
    }

    async fn discard(&self, face_record_id: &str) -> Result<(), MatcherError> {
        self.collection.lock().unwrap().remove(face_record_id);
        Ok(())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

fn candidate(identity_id: &str, confidence: f32) -> MatchCandidate {
    MatchCandidate {
        identity_id: identity_id.into(),
        confidence,
        bounding_box: None,
    }
}

fn s3_record(bucket: &str, key: &str, sequencer: &str) -> Value {
    json!({
        "eventSource": "aws:s3",
        "eventTime": "2024-05-01T08:30:00.000Z",
        "eventName": "ObjectCreated:Put",
        "s3": {
            "bucket": { "name": bucket },
            "object": { "key": key, "sequencer": sequencer }
        }
    })
}

fn notification(records: Vec<Value>) -> Value {
    json!({ "Records": records })
}

fn attendance_config(threshold: f32) -> PipelineConfig {
    PipelineConfig {
        match_threshold: threshold,
        ..PipelineConfig::new(Mode::Attendance)
    }
}

fn setup(
    config: PipelineConfig,
    matcher: ScriptedMatcher,
) -> (Pipeline, Arc<ScriptedMatcher>, Arc<InMemoryLedger>) {
    let matcher = Arc::new(matcher);
    let ledger = Arc::new(InMemoryLedger::new());
    let pipeline = Pipeline::new(config, matcher.clone(), ledger.clone());
    (pipeline, matcher, ledger)
}

#[tokio::test]
async fn recognized_employee_is_marked_present() {
    let matcher =
        ScriptedMatcher::default().with("emp42/photo.jpg", Ok(Some(candidate("emp42", 97.0))));
    let (pipeline, _, ledger) = setup(attendance_config(95.0), matcher);

    let outcomes = pipeline
        .process_notification(
            &notification(vec![s3_record("uploads", "emp42/photo.jpg", "01")]),
            now(),
        )
        .await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].terminal, Terminal::Committed { inserted: true });

    let records = ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].identity_id, "emp42");
    assert_eq!(records[0].outcome_kind, OutcomeKind::Matched);

    let response = report(&outcomes[0]);
    assert_eq!(response.status_code, 200);
    assert!(response.body.starts_with("Attendance marked for emp42"));
}

#[tokio::test]
async fn unknown_face_is_not_found() {
    let (pipeline, _, ledger) = setup(attendance_config(95.0), ScriptedMatcher::default());

    let outcomes = pipeline
        .process_notification(
            &notification(vec![s3_record("uploads", "emp42/photo.jpg", "01")]),
            now(),
        )
        .await;

    assert_eq!(outcomes[0].status, OutcomeStatus::NotFound);
    let response = report(&outcomes[0]);
    assert_eq!(response.status_code, 404);
    assert_eq!(response.body, "Face not recognized");

    // audited by default
    assert_eq!(ledger.records()[0].outcome_kind, OutcomeKind::NoMatch);
}

#[tokio::test]
async fn matcher_outage_writes_nothing() {
    let matcher = ScriptedMatcher::default().with(
        "emp42/photo.jpg",
        Err(MatcherError::Unavailable("connection refused".into())),
    );
    let (pipeline, _, ledger) = setup(attendance_config(95.0), matcher);

    let outcomes = pipeline
        .process_notification(
            &notification(vec![s3_record("uploads", "emp42/photo.jpg", "01")]),
            now(),
        )
        .await;

    assert_eq!(outcomes[0].terminal, Terminal::Failed(FailureKind::Retryable));
    let response = report(&outcomes[0]);
    assert_eq!(response.status_code, 500);
    assert!(response.body.starts_with("Error: "));
    assert!(ledger.records().is_empty());
}

#[tokio::test]
async fn redelivery_is_idempotent() {
    let matcher =
        ScriptedMatcher::default().with("emp42/photo.jpg", Ok(Some(candidate("emp42", 99.0))));
    let (pipeline, _, ledger) = setup(attendance_config(95.0), matcher);
    let raw = notification(vec![s3_record("uploads", "emp42/photo.jpg", "01")]);

    let first = pipeline.process_notification(&raw, now()).await;
    let second = pipeline
        .process_notification(&raw, now() + chrono::Duration::minutes(3))
        .await;

    assert_eq!(first[0].terminal, Terminal::Committed { inserted: true });
    assert_eq!(second[0].terminal, Terminal::Committed { inserted: false });
    assert_eq!(second[0].status, OutcomeStatus::Success);
    assert_eq!(ledger.records().len(), 1);
}

#[tokio::test]
async fn redelivery_reports_the_stored_outcome() {
    let ledger = Arc::new(InMemoryLedger::new());
    let raw = json!({ "bucketName": "uploads", "objectKey": "uploads/1.png" });

    // the face is unknown on the first delivery and enrolled before the second
    let before = Pipeline::new(
        attendance_config(95.0),
        Arc::new(ScriptedMatcher::default()),
        ledger.clone(),
    );
    let after = Pipeline::new(
        attendance_config(95.0),
        Arc::new(
            ScriptedMatcher::default().with("uploads/1.png", Ok(Some(candidate("emp42", 99.0)))),
        ),
        ledger.clone(),
    );

    let first = before.process_notification(&raw, now()).await;
    let second = after.process_notification(&raw, now()).await;

    assert_eq!(report(&first[0]).status_code, 404);
    assert_eq!(second[0].terminal, Terminal::Committed { inserted: false });
    let response = report(&second[0]);
    assert_eq!(response.status_code, 404);
    assert_eq!(response.body, "Face not recognized");

    let records = ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].identity_id, "Unknown");
    assert_eq!(records[0].outcome_kind, OutcomeKind::NoMatch);
}

#[tokio::test]
async fn concurrent_deliveries_insert_once() {
    let matcher =
        ScriptedMatcher::default().with("emp42/photo.jpg", Ok(Some(candidate("emp42", 99.0))));
    let (pipeline, _, ledger) = setup(attendance_config(95.0), matcher);
    let pipeline = Arc::new(pipeline);
    let raw = notification(vec![s3_record("uploads", "emp42/photo.jpg", "01")]);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = pipeline.clone();
            let raw = raw.clone();
            tokio::spawn(async move { pipeline.process_notification(&raw, now()).await })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        let outcomes = handle.await.unwrap();
        if outcomes[0].terminal == (Terminal::Committed { inserted: true }) {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(ledger.records().len(), 1);
}

#[tokio::test]
async fn threshold_boundary() {
    let matcher = ScriptedMatcher::default()
        .with("emp1/at.jpg", Ok(Some(candidate("emp1", 95.0))))
        .with("emp2/below.jpg", Ok(Some(candidate("emp2", 94.9))));
    let (pipeline, _, _) = setup(attendance_config(95.0), matcher);

    let outcomes = pipeline
        .process_notification(
            &notification(vec![
                s3_record("uploads", "emp1/at.jpg", "01"),
                s3_record("uploads", "emp2/below.jpg", "02"),
            ]),
            now(),
        )
        .await;

    let kinds: Vec<_> = outcomes
        .iter()
        .map(|outcome| outcome.record.as_ref().unwrap().outcome_kind)
        .collect();
    assert_eq!(kinds, [OutcomeKind::Matched, OutcomeKind::NoMatch]);
}

#[tokio::test]
async fn batch_records_are_processed_independently() {
    let matcher = ScriptedMatcher::default()
        .with("emp1/a.jpg", Ok(Some(candidate("emp1", 99.0))))
        .with("emp2/b.jpg", Ok(Some(candidate("emp2", 98.0))))
        .with("emp3/c.jpg", Ok(Some(candidate("emp3", 97.0))));
    let (pipeline, matcher, ledger) = setup(attendance_config(95.0), matcher);

    let outcomes = pipeline
        .process_notification(
            &notification(vec![
                s3_record("uploads", "emp1/a.jpg", "01"),
                s3_record("uploads", "emp2/b.jpg", "02"),
                s3_record("uploads", "emp3/c.jpg", "03"),
            ]),
            now(),
        )
        .await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(matcher.calls(), 3);
    assert!(outcomes
        .iter()
        .all(|outcome| outcome.terminal == Terminal::Committed { inserted: true }));
    assert_eq!(ledger.records().len(), 3);
    assert_eq!(report_batch(&outcomes).status_code, 200);
}

#[tokio::test]
async fn missing_object_key_fails_before_matching() {
    let (pipeline, matcher, ledger) = setup(attendance_config(95.0), ScriptedMatcher::default());

    let outcomes = pipeline
        .process_notification(&json!({ "bucketName": "uploads" }), now())
        .await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].terminal, Terminal::Failed(FailureKind::Malformed));
    assert_eq!(matcher.calls(), 0);
    assert!(ledger.records().is_empty());
}

#[tokio::test]
async fn daily_limit_caps_marks_per_day() {
    let matcher = ScriptedMatcher::default()
        .with("uploads/1.png", Ok(Some(candidate("emp42", 99.0))))
        .with("uploads/2.png", Ok(Some(candidate("emp42", 99.0))))
        .with("uploads/3.png", Ok(Some(candidate("emp42", 99.0))))
        .with("uploads/4.png", Ok(Some(candidate("emp42", 99.0))));
    let config = PipelineConfig {
        daily_limit: Some(2),
        ..attendance_config(95.0)
    };
    let (pipeline, _, ledger) = setup(config, matcher);

    let mut statuses = Vec::new();
    for key in ["uploads/1.png", "uploads/2.png", "uploads/3.png"] {
        let raw = json!({ "bucketName": "uploads", "objectKey": key });
        let outcomes = pipeline.process_notification(&raw, now()).await;
        statuses.push(outcomes[0].terminal);
    }

    assert_eq!(
        statuses,
        [
            Terminal::Committed { inserted: true },
            Terminal::Committed { inserted: true },
            Terminal::Rejected(RejectReason::LimitReached { limit: 2 }),
        ]
    );
    assert_eq!(ledger.records().len(), 2);

    // replaying an already counted upload is not a limit violation
    let replay = pipeline
        .process_notification(&json!({ "bucketName": "uploads", "objectKey": "uploads/1.png" }), now())
        .await;
    assert_eq!(replay[0].terminal, Terminal::Committed { inserted: false });

    // nor on a later day, once that day's limit is used up too
    let tomorrow = now() + chrono::Duration::days(1);
    for key in ["uploads/3.png", "uploads/4.png"] {
        let raw = json!({ "bucketName": "uploads", "objectKey": key });
        let outcomes = pipeline.process_notification(&raw, tomorrow).await;
        assert_eq!(outcomes[0].terminal, Terminal::Committed { inserted: true });
    }
    let late_replay = pipeline
        .process_notification(&json!({ "bucketName": "uploads", "objectKey": "uploads/1.png" }), tomorrow)
        .await;
    assert_eq!(late_replay[0].terminal, Terminal::Committed { inserted: false });
    assert_eq!(
        report(&late_replay[0]).body,
        "Attendance already marked for emp42 at 2024-05-01T09:00:00.000Z"
    );
    assert_eq!(ledger.records().len(), 4);
}

#[tokio::test]
async fn registration_stores_profile() {
    let (pipeline, _, ledger) = setup(PipelineConfig::new(Mode::Registration), ScriptedMatcher::default());

    let outcomes = pipeline
        .process_notification(
            &notification(vec![s3_record("employee-photos", "emp42/photo.jpg", "01")]),
            now(),
        )
        .await;

    let response = report(&outcomes[0]);
    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, "Face registered successfully for emp42");

    let profile = ledger.profile("emp42").unwrap();
    assert_eq!(profile.image_key, "emp42/photo.jpg");
    assert_eq!(profile.face_record_id.as_deref(), Some("face-emp42/photo.jpg"));
    assert_eq!(ledger.records()[0].outcome_kind, OutcomeKind::Registered);
}

#[tokio::test]
async fn low_confidence_registration_leaves_no_face_behind() {
    let (pipeline, matcher, ledger) = setup(
        PipelineConfig::new(Mode::Registration),
        ScriptedMatcher::default().enrolling_at(85.0),
    );

    let outcomes = pipeline
        .process_notification(
            &notification(vec![s3_record("employee-photos", "emp42/photo.jpg", "01")]),
            now(),
        )
        .await;

    assert_eq!(report(&outcomes[0]).status_code, 404);
    assert!(ledger.profile("emp42").is_none());
    assert!(matcher.collection().is_empty());
}

#[tokio::test]
async fn registration_redelivery_indexes_once() {
    let (pipeline, matcher, ledger) =
        setup(PipelineConfig::new(Mode::Registration), ScriptedMatcher::default());
    let raw = notification(vec![s3_record("employee-photos", "emp42/photo.jpg", "01")]);

    pipeline.process_notification(&raw, now()).await;
    let second = pipeline.process_notification(&raw, now()).await;

    assert_eq!(second[0].terminal, Terminal::Committed { inserted: false });
    assert_eq!(matcher.calls(), 1);
    assert_eq!(matcher.collection().len(), 1);
    assert!(ledger.profile("emp42").is_some());
}
