use crate::errors::{DeleteError, ReceiveError};
use async_channel::{Receiver, Recv, Sender};
use aws_sdk_sqs::types::Message;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::sqs_client::SqsClient;

const CHANNEL_CAPACITY: usize = 1000;
const MAX_CONSECUTIVE_RECEIVE_FAILURES: u32 = 5;

/// Background poller feeding received messages into a channel shared by the
/// worker tasks.
#[derive(Clone)]
pub struct SqsListener {
    receiver: Receiver<Message>,
    client: SqsClient,
}

impl SqsListener {
    pub fn new(
        client: SqsClient,
        poll_interval: Duration,
    ) -> (Self, JoinHandle<Result<(), ReceiveError>>) {
        let (sender, receiver) = async_channel::bounded(CHANNEL_CAPACITY);
        let handle = tokio::spawn(Self::listen(client.clone(), sender, poll_interval));

        (Self { receiver, client }, handle)
    }

    async fn listen(
        client: SqsClient,
        sender: Sender<Message>,
        poll_interval: Duration,
    ) -> Result<(), ReceiveError> {
        info!("Listening on {}", client.queue_url());

        let mut failures = 0;
        loop {
            let response = match client.receive_message().await {
                Ok(val) => {
                    failures = 0;
                    val
                }
                Err(err) => {
                    failures += 1;
                    if failures >= MAX_CONSECUTIVE_RECEIVE_FAILURES {
                        return Err(err);
                    }
                    warn!("receive failed ({} in a row): {}", failures, err);
                    sleep(poll_interval * failures).await;
                    continue;
                }
            };

            let messages = if let Some(messages) = response.messages {
                messages
            } else {
                continue;
            };

            for message in messages {
                if sender.send(message).await.is_err() {
                    return Ok(());
                }
            }

            sleep(poll_interval).await;
        }
    }

    pub fn recv(&self) -> Recv<'_, Message> {
        self.receiver.recv()
    }

    pub async fn delete_message(
        &self,
        receipt_handle: impl Into<String>,
    ) -> Result<(), DeleteError> {
        self.client.delete_message(receipt_handle).await
    }

    /// Stops delivery to every clone of this listener.
    pub fn close(&self) {
        self.receiver.close();
    }
}
