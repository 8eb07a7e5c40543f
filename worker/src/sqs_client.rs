use crate::errors::{DeleteError, ReceiveError};
use aws_sdk_sqs::operation::receive_message::ReceiveMessageOutput;

// SQS caps both of these
const MAX_MESSAGES: i32 = 10;
const WAIT_TIME_SECONDS: i32 = 20;

#[derive(Debug, Clone)]
pub struct SqsClient {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsClient {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Long-polls the queue for up to [`MAX_MESSAGES`] notifications.
    pub async fn receive_message(&self) -> Result<ReceiveMessageOutput, ReceiveError> {
        self.client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(MAX_MESSAGES)
            .wait_time_seconds(WAIT_TIME_SECONDS)
            .send()
            .await
    }

    pub async fn delete_message(
        &self,
        receipt_handle: impl Into<String>,
    ) -> Result<(), DeleteError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await?;

        Ok(())
    }
}
