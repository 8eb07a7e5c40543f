//! Ingestion pipeline.
//!
//! Every invocation walks `Received -> Normalized -> Resolved -> Decided` and
//! ends in one of `Committed`, `Rejected` or `Failed`. Failures are classified
//! but never retried here: retryable ones are surfaced so the host redelivers
//! the notification, which is safe because the ledger write is conditional on
//! the dedup key. A redelivered event is answered from the stored record.

use crate::config::{Mode, PipelineConfig};
use crate::event::{self, MalformedEventError};
use crate::ledger::{LedgerError, LedgerStore, Recorded};
use crate::matcher::{MatcherClient, MatcherError};
use crate::model::{
    AttendanceRecord, EmployeeProfile, FailureKind, ImageEvent, MatchCandidate, OutcomeKind,
    PipelineOutcome, RejectReason, UNKNOWN_IDENTITY,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Malformed(#[from] MalformedEventError),
    #[error(transparent)]
    Matcher(#[from] MatcherError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Malformed(_) => FailureKind::Malformed,
            PipelineError::Matcher(err) if err.is_retryable() => FailureKind::Retryable,
            PipelineError::Ledger(err) if err.is_retryable() => FailureKind::Retryable,
            PipelineError::Matcher(_) | PipelineError::Ledger(_) => FailureKind::Permanent,
        }
    }
}

/// Classifies a candidate against the confidence floor. Equal counts as a match.
pub fn decide(candidate: Option<&MatchCandidate>, threshold: f32, on_match: OutcomeKind) -> OutcomeKind {
    match candidate {
        Some(candidate) if candidate.confidence >= threshold => on_match,
        _ => OutcomeKind::NoMatch,
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    matcher: Arc<dyn MatcherClient>,
    ledger: Arc<dyn LedgerStore>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        matcher: Arc<dyn MatcherClient>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            config,
            matcher,
            ledger,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalizes `raw` and processes each of its records independently.
    ///
    /// A notification that cannot be normalized yields a single
    /// `Failed(Malformed)` outcome.
    pub async fn process_notification(
        &self,
        raw: &Value,
        received_at: DateTime<Utc>,
    ) -> Vec<PipelineOutcome> {
        match event::normalize(raw, received_at) {
            Ok(events) => self.process_events(&events).await,
            Err(err) => vec![self.malformed(err)],
        }
    }

    /// Same as [`Pipeline::process_notification`] for a raw message body.
    pub async fn process_body(&self, body: &str, received_at: DateTime<Utc>) -> Vec<PipelineOutcome> {
        match event::parse(body, received_at) {
            Ok(events) => self.process_events(&events).await,
            Err(err) => vec![self.malformed(err)],
        }
    }

    async fn process_events(&self, events: &[ImageEvent]) -> Vec<PipelineOutcome> {
        info!(stage = "Normalized", records = events.len());

        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.process(event).await);
        }
        outcomes
    }

    fn malformed(&self, err: MalformedEventError) -> PipelineOutcome {
        warn!(stage = "Failed", error = %err, "dropping notification");
        PipelineOutcome::failed(FailureKind::Malformed, err)
    }

    /// Runs one event to a terminal state.
    #[instrument(skip_all, fields(dedup_key = %event.dedup_key, key = %event.object_key))]
    pub async fn process(&self, event: &ImageEvent) -> PipelineOutcome {
        info!(stage = "Received", bucket = %event.source_bucket);

        let result = match self.config.mode {
            Mode::Attendance => self.attend(event).await,
            Mode::Registration => self.register(event).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let kind = err.kind();
                error!(stage = "Failed", ?kind, error = %err);
                PipelineOutcome::failed(kind, err)
            }
        }
    }

    async fn attend(&self, event: &ImageEvent) -> Result<PipelineOutcome, PipelineError> {
        if let Some(outcome) = self.replay(event).await? {
            return Ok(outcome);
        }

        let candidate = self.matcher.resolve(event).await?;
        log_resolved(candidate.as_ref());

        let kind = decide(
            candidate.as_ref(),
            self.config.match_threshold,
            OutcomeKind::Matched,
        );
        info!(stage = "Decided", outcome_kind = %kind);

        let identity_id = match (&candidate, kind) {
            (Some(candidate), OutcomeKind::Matched) => candidate.identity_id.clone(),
            _ => UNKNOWN_IDENTITY.to_string(),
        };
        let record = record_for(event, identity_id, kind, candidate.as_ref());

        match kind {
            OutcomeKind::NoMatch if !self.config.audit_unmatched => {
                info!(stage = "Rejected", "unmatched face not audited");
                return Ok(PipelineOutcome::rejected(RejectReason::Unmatched, None));
            }
            OutcomeKind::Matched => {
                if let Some(limit) = self.config.daily_limit {
                    if let Some(outcome) = self.check_daily_limit(&record, limit).await? {
                        return Ok(outcome);
                    }
                }
            }
            _ => {}
        }

        self.commit(record).await
    }

    async fn register(&self, event: &ImageEvent) -> Result<PipelineOutcome, PipelineError> {
        let identity_id = event::identity_from_key(&event.object_key)?;
        if let Some(outcome) = self.replay(event).await? {
            return Ok(outcome);
        }

        let enrollment = self.matcher.enroll(event, &identity_id).await?;

        let candidate = enrollment.as_ref().map(|enrollment| MatchCandidate {
            identity_id: identity_id.clone(),
            confidence: enrollment.confidence,
            bounding_box: enrollment.bounding_box,
        });
        log_resolved(candidate.as_ref());

        let kind = decide(
            candidate.as_ref(),
            self.config.match_threshold,
            OutcomeKind::Registered,
        );
        info!(stage = "Decided", outcome_kind = %kind);

        let record = record_for(event, identity_id, kind, candidate.as_ref());

        if kind == OutcomeKind::NoMatch {
            // an indexed face without a profile would still match in attendance mode
            if let Some(enrollment) = &enrollment {
                self.matcher.discard(&enrollment.face_record_id).await?;
                info!(
                    stage = "Decided",
                    face_record_id = %enrollment.face_record_id,
                    "discarded face below threshold"
                );
            }

            if !self.config.audit_unmatched {
                info!(stage = "Rejected", "no face enrolled");
                return Ok(PipelineOutcome::rejected(RejectReason::Unmatched, None));
            }
        }

        if kind == OutcomeKind::Registered {
            let profile = EmployeeProfile {
                identity_id: record.identity_id.clone(),
                image_key: event.object_key.clone(),
                registered_at: event.received_at,
                face_record_id: enrollment.map(|enrollment| enrollment.face_record_id),
            };
            self.ledger.put_profile(&profile).await?;
        }

        self.commit(record).await
    }

    /// Answers a redelivered event with the record stored by its first run.
    async fn replay(&self, event: &ImageEvent) -> Result<Option<PipelineOutcome>, PipelineError> {
        let Some(stored) = self.ledger.find_record(&event.dedup_key).await? else {
            return Ok(None);
        };

        info!(
            stage = "Committed",
            inserted = false,
            identity_id = %stored.identity_id,
            outcome_kind = %stored.outcome_kind,
            "replay of a stored record"
        );
        Ok(Some(PipelineOutcome::committed(stored, false)))
    }

    /// `Some` rejection when `record` would exceed the daily limit.
    async fn check_daily_limit(
        &self,
        record: &AttendanceRecord,
        limit: u32,
    ) -> Result<Option<PipelineOutcome>, PipelineError> {
        let today = self
            .ledger
            .records_for_day(&record.identity_id, &record.day())
            .await?;

        let marked = today
            .iter()
            .filter(|r| r.outcome_kind == OutcomeKind::Matched)
            .count();
        if marked >= limit as usize {
            info!(stage = "Rejected", marked, limit, "daily limit reached");
            return Ok(Some(PipelineOutcome::rejected(
                RejectReason::LimitReached { limit },
                Some(record.clone()),
            )));
        }

        Ok(None)
    }

    /// Losing the conditional write to a concurrent delivery reports what
    /// the winner stored, not what this run computed.
    async fn commit(&self, record: AttendanceRecord) -> Result<PipelineOutcome, PipelineError> {
        let (record, inserted) = match self.ledger.record_if_absent(&record).await? {
            Recorded::Inserted => (record, true),
            Recorded::Existing(stored) => (stored, false),
        };
        info!(
            stage = "Committed",
            inserted,
            identity_id = %record.identity_id,
            outcome_kind = %record.outcome_kind
        );

        Ok(PipelineOutcome::committed(record, inserted))
    }
}

fn log_resolved(candidate: Option<&MatchCandidate>) {
    match candidate {
        Some(candidate) => info!(
            stage = "Resolved",
            identity_id = %candidate.identity_id,
            confidence = candidate.confidence
        ),
        None => info!(stage = "Resolved", "no candidate"),
    }
}

fn record_for(
    event: &ImageEvent,
    identity_id: String,
    kind: OutcomeKind,
    candidate: Option<&MatchCandidate>,
) -> AttendanceRecord {
    AttendanceRecord {
        identity_id,
        observed_at: event.received_at,
        dedup_key: event.dedup_key.clone(),
        outcome_kind: kind,
        image_key: event.object_key.clone(),
        confidence: candidate.map(|candidate| candidate.confidence),
    }
}
