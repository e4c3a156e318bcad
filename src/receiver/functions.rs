use crate::errors::QueueError;
use crate::queue::MessageQueue;
use crate::receiver::config::ReceiveConfig;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Pause after a failed receive before polling again.
pub const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Trait for implementing asynchronous queue message receivers.
///
/// This trait provides a common interface for starting message reception
/// and processing. Implementations handle the details of polling, message
/// processing, and error handling.
#[async_trait]
pub trait AsyncSqsReceiverFunction: Send + Sync {
    /// The queue URL this receiver polls.
    fn queue_url(&self) -> &str;

    /// Long-poll settings used for every receive call.
    fn config(&self) -> &ReceiveConfig;

    /// Polls `queue` until `shutdown` turns `true`.
    ///
    /// # Arguments
    ///
    /// * `queue` - The queue to receive from and delete on
    /// * `shutdown` - Observed between polls
    async fn start_receive(
        &self,
        queue: Arc<dyn MessageQueue>,
        shutdown: watch::Receiver<bool>,
    );
}

#[async_trait]
impl<F, Fut, TShared> AsyncSqsReceiverFunction for AsyncSqsReceiverFunctionImpl<F, Fut, TShared>
where
    F: Fn(String, TShared) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), QueueError>> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    fn queue_url(&self) -> &str {
        &self.queue_url
    }

    fn config(&self) -> &ReceiveConfig {
        &self.config
    }

    async fn start_receive(
        &self,
        queue: Arc<dyn MessageQueue>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let resource = self.shared_resources.clone();
        let rv_fn = self.rv_fn.clone();
        let config = &self.config;

        info!(queue = %queue.queue_ref(), "receiver started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                received = queue.receive(config) => received,
                _ = shutdown.changed() => break,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    error!(queue = %queue.queue_ref(), error = %e, "error receiving messages");
                    tokio::select! {
                        _ = tokio::time::sleep(RECEIVE_ERROR_PAUSE) => continue,
                        _ = shutdown.changed() => break,
                    }
                }
            };
            if messages.is_empty() {
                debug!(queue = %queue.queue_ref(), "no messages received");
                continue;
            }

            for message in messages {
                debug!(message_id = %message.message_id, "received message");
                if let Err(e) = (rv_fn)(message.body, resource.clone()).await {
                    warn!(
                        message_id = %message.message_id,
                        error = %e,
                        "error handling message, leaving it on the queue"
                    );
                } else if let Err(delete_err) = queue.delete(&message.receipt_handle).await {
                    // Delete the message after successful processing
                    error!(
                        message_id = %message.message_id,
                        error = %delete_err,
                        "error deleting message"
                    );
                }
            }
        }

        info!(queue = %queue.queue_ref(), "receiver stopped");
    }
}

/// Implementation of `AsyncSqsReceiverFunction` that handles message processing.
///
/// This struct wraps a user-provided function and shared resources, providing
/// the logic for polling queues, processing messages, and handling errors.
///
/// # Type Parameters
///
/// * `RFn` - The message handler function type
/// * `Fut` - The future returned by the handler function
/// * `TShared` - The type of shared resources passed to the handler
pub struct AsyncSqsReceiverFunctionImpl<RFn, Fut, TShared>
where
    RFn: Fn(String, TShared) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), QueueError>> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    rv_fn: RFn,
    queue_url: String,
    shared_resources: TShared,
    config: ReceiveConfig,
}

impl<RFn, Fut, TShared> AsyncSqsReceiverFunctionImpl<RFn, Fut, TShared>
where
    RFn: Fn(String, TShared) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), QueueError>> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    /// Creates a new instance of the receiver function implementation.
    ///
    /// # Arguments
    ///
    /// * `rv_fn` - The message handler function
    /// * `queue_url` - The queue URL to poll
    /// * `shared_resources` - Resources shared between message processing calls
    /// * `config` - Long-poll settings for every receive call
    pub fn new(
        rv_fn: RFn,
        queue_url: &str,
        shared_resources: TShared,
        config: ReceiveConfig,
    ) -> Self {
        AsyncSqsReceiverFunctionImpl {
            rv_fn,
            queue_url: queue_url.to_string(),
            shared_resources,
            config,
        }
    }
}
