//! Queue-facing types shared by every backend.

use std::fmt;

use async_trait::async_trait;

use crate::errors::Result;
use crate::receiver::config::ReceiveConfig;

/// Opaque locator of a queue, either a queue URL or an ARN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueRef(String);

impl QueueRef {
    pub fn new(locator: impl Into<String>) -> Self {
        QueueRef(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueRef {
    fn from(s: &str) -> Self {
        QueueRef::new(s)
    }
}

impl From<String> for QueueRef {
    fn from(s: String) -> Self {
        QueueRef(s)
    }
}

/// Token scoped to one delivery of one message.
///
/// Only the most recently issued handle of a message may be used to change
/// its visibility or delete it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        ReceiptHandle(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReceiptHandle {
    fn from(s: &str) -> Self {
        ReceiptHandle::new(s)
    }
}

/// A message delivered by a receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: ReceiptHandle,
    pub body: String,
    /// Number of deliveries so far, when the backend reports it.
    pub receive_count: Option<u32>,
}

/// The operations a pull-based queue has to offer to the receive cycle.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// The queue this backend is bound to.
    fn queue_ref(&self) -> &QueueRef;

    /// Long-polls for up to `config.max_number_of_messages()` messages.
    ///
    /// Returns an empty vector when nothing arrived within the wait time.
    async fn receive(&self, config: &ReceiveConfig) -> Result<Vec<ReceivedMessage>>;

    /// Sets the remaining invisibility of an in-flight message to
    /// `timeout_seconds` and returns the handle that is current afterwards.
    async fn change_visibility(
        &self,
        receipt_handle: &ReceiptHandle,
        timeout_seconds: i32,
    ) -> Result<ReceiptHandle>;

    /// Permanently removes the message delivered under `receipt_handle`.
    async fn delete(&self, receipt_handle: &ReceiptHandle) -> Result<()>;

    /// Enqueues `body` and returns the new message id.
    async fn send(&self, body: &str) -> Result<String>;
}

#[async_trait]
impl<Q> MessageQueue for std::sync::Arc<Q>
where
    Q: MessageQueue + ?Sized,
{
    fn queue_ref(&self) -> &QueueRef {
        (**self).queue_ref()
    }

    async fn receive(&self, config: &ReceiveConfig) -> Result<Vec<ReceivedMessage>> {
        (**self).receive(config).await
    }

    async fn change_visibility(
        &self,
        receipt_handle: &ReceiptHandle,
        timeout_seconds: i32,
    ) -> Result<ReceiptHandle> {
        (**self).change_visibility(receipt_handle, timeout_seconds).await
    }

    async fn delete(&self, receipt_handle: &ReceiptHandle) -> Result<()> {
        (**self).delete(receipt_handle).await
    }

    async fn send(&self, body: &str) -> Result<String> {
        (**self).send(body).await
    }
}
