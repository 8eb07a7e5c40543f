use aws_sdk_sqs::config::http::HttpResponse;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::operation::delete_message::DeleteMessageError;
use aws_sdk_sqs::operation::receive_message::ReceiveMessageError;
use face_attendance::config::ConfigError;
use thiserror::Error;

pub type ReceiveError = SdkError<ReceiveMessageError, HttpResponse>;
pub type DeleteError = SdkError<DeleteMessageError, HttpResponse>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("QUEUE_URL must be provided")]
    MissingQueueUrl,
    #[error("sqs receive failed: {0}")]
    Receive(#[from] ReceiveError),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}
