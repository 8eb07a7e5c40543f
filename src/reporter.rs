//! Maps pipeline outcomes to the response contract of the lambdas.

use crate::model::{format_timestamp, OutcomeKind, OutcomeStatus, PipelineOutcome, Terminal};
use serde::Serialize;

/// `{statusCode, body}` returned by the event-triggered lambdas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub body: String,
}

pub fn status_code(status: OutcomeStatus) -> u16 {
    match status {
        OutcomeStatus::Success => 200,
        OutcomeStatus::NotFound => 404,
        OutcomeStatus::LimitReached => 400,
        OutcomeStatus::TransientFailure | OutcomeStatus::PermanentFailure => 500,
    }
}

fn severity(status: OutcomeStatus) -> u8 {
    match status {
        OutcomeStatus::Success => 0,
        OutcomeStatus::NotFound => 1,
        OutcomeStatus::LimitReached => 2,
        OutcomeStatus::TransientFailure | OutcomeStatus::PermanentFailure => 3,
    }
}

pub fn report(outcome: &PipelineOutcome) -> Response {
    Response {
        status_code: status_code(outcome.status),
        body: outcome.message.clone(),
    }
}

/// Worst status of the batch wins; messages are joined line by line.
pub fn report_batch(outcomes: &[PipelineOutcome]) -> Response {
    let Some(worst) = outcomes.iter().map(|outcome| outcome.status).max_by_key(|s| severity(*s))
    else {
        return Response {
            status_code: 500,
            body: "Error: notification produced no outcome".into(),
        };
    };

    Response {
        status_code: status_code(worst),
        body: outcomes
            .iter()
            .map(|outcome| outcome.message.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// JSON body of the synchronous attendance endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn attendance_body(outcome: &PipelineOutcome) -> AttendanceBody {
    if let Terminal::Failed(_) = outcome.terminal {
        return AttendanceBody {
            message: "Internal server error".into(),
            employee_id: None,
            date: None,
            time: None,
            error: Some(outcome.message.clone()),
        };
    }

    let matched = outcome
        .record
        .as_ref()
        .filter(|record| record.outcome_kind != OutcomeKind::NoMatch);

    AttendanceBody {
        message: outcome.message.clone(),
        employee_id: matched.map(|record| record.identity_id.clone()),
        date: matched.map(|record| record.day()),
        time: matched.map(|record| format_timestamp(&record.observed_at)),
        error: None,
    }
}
