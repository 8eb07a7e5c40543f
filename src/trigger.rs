//! Wiring shared by the notification-triggered lambdas and the queue worker.

use crate::config::{Mode, PipelineConfig};
use crate::ledger::DynamoLedger;
use crate::matcher::RekognitionMatcher;
use crate::model::PipelineOutcome;
use crate::pipeline::Pipeline;
use crate::reporter::{report_batch, Response};
use aws_config::{BehaviorVersion, SdkConfig};
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Pipeline over Rekognition and DynamoDB clients built from `sdk_config`.
pub fn build_pipeline(config: PipelineConfig, sdk_config: &SdkConfig) -> Pipeline {
    let matcher = RekognitionMatcher::new(
        aws_sdk_rekognition::Client::new(sdk_config),
        config.collection_id.clone(),
        config.match_threshold,
        config.max_candidates,
    );
    let ledger = DynamoLedger::new(
        aws_sdk_dynamodb::Client::new(sdk_config),
        config.table_name.clone(),
        config.profile_table_name.clone(),
        config.identity_index.clone(),
    );

    Pipeline::new(config, Arc::new(matcher), Arc::new(ledger))
}

/// Handles one notification. Fails the invocation when any record hit a
/// retryable failure so the host redelivers the whole notification.
pub async fn handle_notification(pipeline: &Pipeline, payload: &Value) -> Result<Response, Error> {
    let outcomes = pipeline.process_notification(payload, Utc::now()).await;
    let response = report_batch(&outcomes);

    if outcomes.iter().any(PipelineOutcome::is_retryable) {
        error!(status_code = response.status_code, "retryable failure, requesting redelivery");
        return Err(response.body.into());
    }

    info!(status_code = response.status_code, records = outcomes.len(), "notification handled");
    Ok(response)
}

/// Runs the lambda runtime loop for a pipeline in `mode`.
pub async fn run(mode: Mode) -> Result<(), Error> {
    let config = PipelineConfig::from_env(mode)?;
    info!(?mode, collection_id = %config.collection_id, table = %config.table_name, "starting");

    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let pipeline = build_pipeline(config, &sdk_config);

    lambda_runtime::run(service_fn(|event: LambdaEvent<Value>| {
        let pipeline = &pipeline;
        async move { handle_notification(pipeline, &event.payload).await }
    }))
    .await
}
