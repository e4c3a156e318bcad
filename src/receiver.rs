use std::future::Future;
use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::client::with_receive_timeout;
use crate::errors::{QueueError, Result};
use crate::queue::{MessageQueue, ReceiptHandle, ReceivedMessage};
use crate::sqs::SqsQueue;

pub mod config;
mod functions;

pub use functions::{AsyncSqsReceiverFunction, AsyncSqsReceiverFunctionImpl, RECEIVE_ERROR_PAUSE};

use config::ReceiveConfig;

/// What happened during one [`ReceiveCycle::process_one`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing arrived within the long-poll wait.
    Empty,
    /// The handler succeeded and the message was deleted.
    Acknowledged { message_id: String },
    /// The handler failed; the message becomes visible again once its
    /// visibility timeout lapses.
    HandlerFailed { message_id: String, error: String },
}

/// Receive, extend and acknowledge against a single queue.
///
/// None of the operations retry. A failure is logged once and returned.
pub struct ReceiveCycle<Q> {
    queue: Q,
    config: ReceiveConfig,
    processing_timeout: Option<i32>,
}

impl<Q: MessageQueue> ReceiveCycle<Q> {
    pub fn new(queue: Q, config: ReceiveConfig) -> Self {
        ReceiveCycle {
            queue,
            config,
            processing_timeout: None,
        }
    }

    /// Extends visibility to `seconds` after receiving and before handling in
    /// [`ReceiveCycle::process_one`].
    pub fn with_processing_timeout(mut self, seconds: i32) -> Result<Self> {
        config::validate_visibility_timeout(seconds)?;
        self.processing_timeout = Some(seconds);
        Ok(self)
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn config(&self) -> &ReceiveConfig {
        &self.config
    }

    /// Long-polls once. An empty result means no message was available.
    pub async fn receive(&self) -> Result<Vec<ReceivedMessage>> {
        self.queue.receive(&self.config).await.inspect_err(|e| {
            error!(queue = %self.queue.queue_ref(), error = %e, "receive failed");
        })
    }

    /// Long-polls once for at most one message.
    ///
    /// Requests a single message whatever the configured batch size, so no
    /// message is hidden without being returned.
    pub async fn receive_one(&self) -> Result<Option<ReceivedMessage>> {
        let messages = self
            .queue
            .receive(&self.config.single_message())
            .await
            .inspect_err(|e| {
                error!(queue = %self.queue.queue_ref(), error = %e, "receive failed");
            })?;
        Ok(messages.into_iter().next())
    }

    /// Extends the invisibility window of a received message.
    ///
    /// Returns the handle to use from now on; the handle passed in must be
    /// the most recent one issued for the message.
    pub async fn extend_visibility(
        &self,
        receipt_handle: &ReceiptHandle,
        timeout_seconds: i32,
    ) -> Result<ReceiptHandle> {
        self.queue
            .change_visibility(receipt_handle, timeout_seconds)
            .await
            .inspect_err(|e| {
                error!(queue = %self.queue.queue_ref(), error = %e, "visibility extension failed");
            })
    }

    /// Deletes a received message.
    pub async fn acknowledge(&self, receipt_handle: &ReceiptHandle) -> Result<()> {
        self.queue.delete(receipt_handle).await.inspect_err(|e| {
            error!(queue = %self.queue.queue_ref(), error = %e, "acknowledge failed");
        })
    }

    /// Runs one full cycle: receive at most one message, extend its
    /// visibility if a processing timeout is set, hand the body to `handler`
    /// and acknowledge it when the handler succeeds.
    pub async fn process_one<F, Fut>(&self, handler: F) -> Result<CycleOutcome>
    where
        F: FnOnce(ReceivedMessage) -> Fut,
        Fut: Future<Output = Result<(), QueueError>>,
    {
        let Some(mut message) = self.receive_one().await? else {
            debug!(queue = %self.queue.queue_ref(), "no messages received");
            return Ok(CycleOutcome::Empty);
        };
        let message_id = message.message_id.clone();

        if let Some(seconds) = self.processing_timeout {
            message.receipt_handle = self
                .extend_visibility(&message.receipt_handle, seconds)
                .await?;
        }

        let receipt_handle = message.receipt_handle.clone();
        if let Err(e) = handler(message).await {
            warn!(%message_id, error = %e, "handler failed, message left unacknowledged");
            return Ok(CycleOutcome::HandlerFailed {
                message_id,
                error: e.to_string(),
            });
        }

        self.acknowledge(&receipt_handle).await?;
        info!(%message_id, "message acknowledged");
        Ok(CycleOutcome::Acknowledged { message_id })
    }
}

/// A registry of queue handlers, each polled by its own task.
#[derive(Default)]
pub struct AwsSqsReceiver {
    handlers: Vec<Box<dyn AsyncSqsReceiverFunction>>,
}

impl AwsSqsReceiver {
    pub fn new() -> Self {
        AwsSqsReceiver {
            handlers: Vec::new(),
        }
    }

    /// Registers `handler` for `queue_url`.
    ///
    /// Messages are deleted after the handler returns `Ok`. Without an
    /// explicit configuration the receiver long-polls for batches of 10.
    pub fn add_handler_fn<F, Fut, TShared>(
        &mut self,
        queue_url: &str,
        handler: F,
        shared_resources: TShared,
        config: Option<ReceiveConfig>,
    ) where
        F: Fn(String, TShared) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<(), QueueError>> + Send + 'static,
        TShared: Send + Sync + Clone + 'static,
    {
        let config = config.unwrap_or_else(default_loop_config);
        self.handlers.push(Box::new(AsyncSqsReceiverFunctionImpl::new(
            handler,
            queue_url,
            shared_resources,
            config,
        )));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Polls every registered queue through SQS until the process exits.
    ///
    /// Each handler gets its own copy of `sqs_client` whose attempt timeout
    /// is that handler's client timeout.
    pub async fn start_all_handlers(self, sqs_client: aws_sdk_sqs::Client) {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.run(sqs_resolver(sqs_client), shutdown_rx).await;
    }

    /// Polls every registered queue through SQS until `shutdown` fires or
    /// its sender is dropped.
    pub async fn start_all_handlers_with_shutdown(
        self,
        sqs_client: aws_sdk_sqs::Client,
        shutdown: oneshot::Receiver<()>,
    ) {
        let shutdown_rx = forward_shutdown(shutdown);
        self.run(sqs_resolver(sqs_client), shutdown_rx).await;
    }

    /// Polls every registered queue through the backend `resolve` returns
    /// for its URL, until `shutdown` fires or its sender is dropped.
    pub async fn start_all_handlers_with<R>(self, resolve: R, shutdown: oneshot::Receiver<()>)
    where
        R: Fn(&str) -> Arc<dyn MessageQueue>,
    {
        let shutdown_rx = forward_shutdown(shutdown);
        self.run(move |url: &str, _: &ReceiveConfig| resolve(url), shutdown_rx)
            .await;
    }

    async fn run<R>(self, resolve: R, shutdown: watch::Receiver<bool>)
    where
        R: Fn(&str, &ReceiveConfig) -> Arc<dyn MessageQueue>,
    {
        let tasks: Vec<_> = self
            .handlers
            .into_iter()
            .map(|handler| {
                let queue = resolve(handler.queue_url(), handler.config());
                let shutdown = shutdown.clone();
                tokio::spawn(async move { handler.start_receive(queue, shutdown).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "receiver task failed");
            }
        }
    }
}

fn sqs_resolver(
    sqs_client: aws_sdk_sqs::Client,
) -> impl Fn(&str, &ReceiveConfig) -> Arc<dyn MessageQueue> {
    move |url: &str, config: &ReceiveConfig| -> Arc<dyn MessageQueue> {
        Arc::new(SqsQueue::new(with_receive_timeout(&sqs_client, config), url))
    }
}

/// Fans a one-shot shutdown signal out to every receiver task.
fn forward_shutdown(shutdown: oneshot::Receiver<()>) -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = shutdown.await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });
    shutdown_rx
}

fn default_loop_config() -> ReceiveConfig {
    ReceiveConfig::builder()
        .max_number_of_messages(config::MAX_NUMBER_OF_MESSAGES)
        .wait_time_seconds(config::MAX_WAIT_TIME_SECONDS)
        .build()
        .unwrap_or_default()
}

/// Polls `queue_url` with `handler` until the process exits.
///
/// Shorthand for an [`AwsSqsReceiver`] with a single handler.
pub async fn start_receive_queue<F, Fut, TShared>(
    sqs_client: aws_sdk_sqs::Client,
    queue_url: &str,
    shared_resources: TShared,
    handler: F,
) where
    F: Fn(String, TShared) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), QueueError>> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    let mut receiver = AwsSqsReceiver::new();
    receiver.add_handler_fn(queue_url, handler, shared_resources, None);
    receiver.start_all_handlers(sqs_client).await;
}
