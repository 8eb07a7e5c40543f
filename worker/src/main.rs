mod errors;
mod processor;
mod sqs_client;
mod sqs_listener;

use crate::errors::WorkerError;
use crate::sqs_client::SqsClient;
use crate::sqs_listener::SqsListener;
use aws_config::BehaviorVersion;
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use face_attendance::common::init_tracing;
use face_attendance::config::{parse_var, Mode, PipelineConfig};
use face_attendance::trigger::build_pipeline;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const AWS_PROFILE_DEFAULT: &str = "dev";
const WORKER_CONCURRENCY_DEFAULT: usize = 4;
const POLL_INTERVAL_SECS_DEFAULT: u64 = 1;

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    init_tracing();

    let lookup = |name: &str| std::env::var(name).ok();
    let queue_url = lookup("QUEUE_URL").ok_or(WorkerError::MissingQueueUrl)?;
    let mode = match lookup("PIPELINE_MODE") {
        Some(val) => val.parse::<Mode>()?,
        None => Mode::Attendance,
    };
    let concurrency =
        parse_var::<usize>(lookup, "WORKER_CONCURRENCY")?.unwrap_or(WORKER_CONCURRENCY_DEFAULT);
    let poll_interval = Duration::from_secs(
        parse_var::<u64>(lookup, "POLL_INTERVAL_SECS")?.unwrap_or(POLL_INTERVAL_SECS_DEFAULT),
    );
    let config = PipelineConfig::from_env(mode)?;

    let profile_name = std::env::var("AWS_PROFILE").unwrap_or(AWS_PROFILE_DEFAULT.into());
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).profile_name(profile_name);
    if let Ok(credentials) = std::env::var("AWS_CREDENTIALS_FILE") {
        let profile_files = EnvConfigFiles::builder()
            .with_file(EnvConfigFileKind::Credentials, credentials)
            .build();
        loader = loader.profile_files(profile_files);
    }
    let aws_config = loader.load().await;

    let pipeline = Arc::new(build_pipeline(config, &aws_config));
    let sqs_client = SqsClient::new(aws_sdk_sqs::Client::new(&aws_config), queue_url);
    let (sqs_listener, mut listener_handle) = SqsListener::new(sqs_client, poll_interval);

    info!(?mode, concurrency, "starting workers");
    let workers: Vec<_> = (0..concurrency.max(1))
        .map(|_| {
            let pipeline = pipeline.clone();
            let sqs_listener = sqs_listener.clone();
            tokio::spawn(async move {
                while let Ok(message) = sqs_listener.recv().await {
                    processor::handle_message(&pipeline, &sqs_listener, message).await;
                }
            })
        })
        .collect();

    let listener_result = tokio::select! {
        result = &mut listener_handle => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            sqs_listener.close();
            None
        }
    };

    for worker in workers {
        worker.await?;
    }

    match listener_result {
        Some(result) => result?.map_err(|err| {
            error!("listener stopped: {}", err);
            WorkerError::from(err)
        }),
        None => Ok(()),
    }
}
