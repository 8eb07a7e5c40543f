use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity written on audit records when nothing was recognized.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Canonical form of one "object created" notification record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEvent {
    pub source_bucket: String,
    pub object_key: String,
    pub received_at: DateTime<Utc>,
    /// Stable across redelivery of the same notification
    pub dedup_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub width: f32,
    pub height: f32,
    pub left: f32,
    pub top: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub identity_id: String,
    /// 0..=100
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

/// Result of enrolling a face into the matcher's collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub face_record_id: String,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    Matched,
    Registered,
    NoMatch,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Matched => "Matched",
            OutcomeKind::Registered => "Registered",
            OutcomeKind::NoMatch => "NoMatch",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Matched" => Ok(OutcomeKind::Matched),
            "Registered" => Ok(OutcomeKind::Registered),
            "NoMatch" => Ok(OutcomeKind::NoMatch),
            other => Err(format!("unknown outcome kind: {other}")),
        }
    }
}

/// One row of the attendance ledger. At most one exists per `dedup_key`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub identity_id: String,
    pub observed_at: DateTime<Utc>,
    pub dedup_key: String,
    pub outcome_kind: OutcomeKind,
    pub image_key: String,
    pub confidence: Option<f32>,
}

impl AttendanceRecord {
    /// `YYYY-MM-DD` of `observed_at` in UTC.
    pub fn day(&self) -> String {
        self.observed_at.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeProfile {
    pub identity_id: String,
    pub image_key: String,
    pub registered_at: DateTime<Utc>,
    pub face_record_id: Option<String>,
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Malformed,
    Permanent,
    Retryable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unmatched,
    LimitReached { limit: u32 },
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Committed { inserted: bool },
    Rejected(RejectReason),
    Failed(FailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    Success,
    NotFound,
    LimitReached,
    TransientFailure,
    PermanentFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub status: OutcomeStatus,
    pub terminal: Terminal,
    pub record: Option<AttendanceRecord>,
    pub message: String,
}

impl PipelineOutcome {
    pub fn committed(record: AttendanceRecord, inserted: bool) -> Self {
        let when = format_timestamp(&record.observed_at);
        let (status, message) = match (record.outcome_kind, inserted) {
            (OutcomeKind::Matched, true) => (
                OutcomeStatus::Success,
                format!("Attendance marked for {} at {when}", record.identity_id),
            ),
            (OutcomeKind::Matched, false) => (
                OutcomeStatus::Success,
                format!("Attendance already marked for {} at {when}", record.identity_id),
            ),
            (OutcomeKind::Registered, _) => (
                OutcomeStatus::Success,
                format!("Face registered successfully for {}", record.identity_id),
            ),
            (OutcomeKind::NoMatch, _) => (OutcomeStatus::NotFound, "Face not recognized".into()),
        };

        Self {
            status,
            terminal: Terminal::Committed { inserted },
            record: Some(record),
            message,
        }
    }

    pub fn rejected(reason: RejectReason, record: Option<AttendanceRecord>) -> Self {
        let (status, message) = match reason {
            RejectReason::Unmatched => (OutcomeStatus::NotFound, "Face not recognized".into()),
            RejectReason::LimitReached { limit } => (
                OutcomeStatus::LimitReached,
                format!("You cannot mark attendance more than {limit} times today."),
            ),
        };

        Self {
            status,
            terminal: Terminal::Rejected(reason),
            record,
            message,
        }
    }

    pub fn failed(kind: FailureKind, detail: impl fmt::Display) -> Self {
        let status = match kind {
            FailureKind::Retryable => OutcomeStatus::TransientFailure,
            FailureKind::Malformed | FailureKind::Permanent => OutcomeStatus::PermanentFailure,
        };

        Self {
            status,
            terminal: Terminal::Failed(kind),
            record: None,
            message: format!("Error: {detail}"),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.terminal == Terminal::Failed(FailureKind::Retryable)
    }
}
