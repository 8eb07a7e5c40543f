use crate::sqs_listener::SqsListener;
use aws_sdk_sqs::types::Message;
use chrono::Utc;
use face_attendance::model::PipelineOutcome;
use face_attendance::pipeline::Pipeline;
use face_attendance::reporter::report_batch;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Delete,
    /// Left on the queue; it reappears once the visibility timeout expires.
    Retain,
}

pub fn disposition(outcomes: &[PipelineOutcome]) -> Disposition {
    if outcomes.iter().any(PipelineOutcome::is_retryable) {
        Disposition::Retain
    } else {
        Disposition::Delete
    }
}

#[instrument(skip_all, fields(message_id = message.message_id.as_deref().unwrap_or("empty_id")))]
pub async fn handle_message(pipeline: &Pipeline, listener: &SqsListener, message: Message) {
    let body = message.body.as_deref().unwrap_or_default();
    let outcomes = pipeline.process_body(body, Utc::now()).await;
    let response = report_batch(&outcomes);

    match disposition(&outcomes) {
        Disposition::Delete => {
            info!(status_code = response.status_code, "{}", response.body);
            let Some(receipt_handle) = message.receipt_handle else {
                warn!("message has no receipt handle");
                return;
            };
            if let Err(err) = listener.delete_message(receipt_handle).await {
                error!("delete error: {}", err);
            }
        }
        Disposition::Retain => {
            warn!(status_code = response.status_code, "left for redelivery: {}", response.body);
        }
    }
}
