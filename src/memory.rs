//! In-process queue with SQS-like delivery semantics.
//!
//! Every delivery and every visibility change issues a fresh receipt handle;
//! only the latest one is accepted. Visibility is tracked on the tokio clock,
//! so tests can drive it with paused time.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{QueueError, Result};
use crate::queue::{MessageQueue, QueueRef, ReceiptHandle, ReceivedMessage};
use crate::receiver::config::{ReceiveConfig, validate_visibility_timeout};
use crate::redrive::validate_max_receive_count;

/// Visibility timeout applied when a receive request does not set one.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: i32 = 30;

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    receipt_handle: Option<String>,
    visible_at: Instant,
}

#[derive(Debug)]
struct DeadLetterTarget {
    queue: MemoryQueue,
    max_receive_count: u32,
}

#[derive(Debug)]
struct Inner {
    queue_ref: QueueRef,
    messages: Mutex<VecDeque<StoredMessage>>,
    arrivals: Notify,
    dead_letter: Option<DeadLetterTarget>,
}

/// Cloneable handle to an in-memory queue.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    pub fn new(name: &str) -> Self {
        MemoryQueue::build(name, None)
    }

    /// Creates a queue whose messages move to `dead_letter_queue` once they
    /// have been delivered `max_receive_count` times without being deleted.
    ///
    /// `max_receive_count` must lie in the range a redrive policy accepts.
    pub fn with_dead_letter_queue(
        name: &str,
        dead_letter_queue: MemoryQueue,
        max_receive_count: u32,
    ) -> Result<Self> {
        validate_max_receive_count(max_receive_count)?;
        Ok(MemoryQueue::build(
            name,
            Some(DeadLetterTarget {
                queue: dead_letter_queue,
                max_receive_count,
            }),
        ))
    }

    fn build(name: &str, dead_letter: Option<DeadLetterTarget>) -> Self {
        MemoryQueue {
            inner: Arc::new(Inner {
                queue_ref: QueueRef::new(format!("memory://{name}")),
                messages: Mutex::new(VecDeque::new()),
                arrivals: Notify::new(),
                dead_letter,
            }),
        }
    }

    /// Number of stored messages, visible or in flight.
    pub fn len(&self) -> usize {
        self.inner.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages a receive call could return right now.
    pub fn visible_len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .messages
            .lock()
            .iter()
            .filter(|m| m.visible_at <= now)
            .count()
    }

    fn push(&self, message_id: String, body: String) {
        self.inner.messages.lock().push_back(StoredMessage {
            message_id,
            body,
            receive_count: 0,
            receipt_handle: None,
            visible_at: Instant::now(),
        });
        self.inner.arrivals.notify_waiters();
    }

    /// Delivers visible messages and returns them together with the earliest
    /// instant at which an in-flight message becomes visible again.
    fn take_visible(
        &self,
        max: usize,
        visibility: Duration,
    ) -> (Vec<ReceivedMessage>, Option<Instant>) {
        let now = Instant::now();
        let mut delivered = Vec::new();
        let mut dead_lettered = Vec::new();
        let mut next_visible = None::<Instant>;

        {
            let mut messages = self.inner.messages.lock();
            let mut index = 0;
            while index < messages.len() && delivered.len() < max {
                let message = &mut messages[index];
                if message.visible_at > now {
                    next_visible = Some(match next_visible {
                        Some(at) => at.min(message.visible_at),
                        None => message.visible_at,
                    });
                    index += 1;
                    continue;
                }

                let exhausted = self
                    .inner
                    .dead_letter
                    .as_ref()
                    .is_some_and(|dlq| message.receive_count >= dlq.max_receive_count);
                if exhausted {
                    if let Some(moved) = messages.remove(index) {
                        dead_lettered.push(moved);
                    }
                    continue;
                }

                let handle = Uuid::new_v4().to_string();
                message.receive_count += 1;
                message.receipt_handle = Some(handle.clone());
                message.visible_at = now + visibility;
                delivered.push(ReceivedMessage {
                    message_id: message.message_id.clone(),
                    receipt_handle: ReceiptHandle::new(handle),
                    body: message.body.clone(),
                    receive_count: Some(message.receive_count),
                });
                index += 1;
            }
        }

        if let Some(target) = &self.inner.dead_letter {
            for message in dead_lettered {
                info!(
                    queue = %self.inner.queue_ref,
                    dead_letter_queue = %target.queue.inner.queue_ref,
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    "message moved to dead-letter queue"
                );
                target.queue.push(message.message_id, message.body);
            }
        }

        (delivered, next_visible)
    }
}

fn seconds(value: i32) -> Duration {
    Duration::from_secs(value.unsigned_abs().into())
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn queue_ref(&self) -> &QueueRef {
        &self.inner.queue_ref
    }

    async fn receive(&self, config: &ReceiveConfig) -> Result<Vec<ReceivedMessage>> {
        let max = usize::try_from(config.max_number_of_messages()).unwrap_or(1).max(1);
        let visibility = seconds(
            config
                .visibility_timeout()
                .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT_SECONDS),
        );
        let deadline = Instant::now() + config.wait_time();

        loop {
            // Register for arrivals before looking, so a send in between is not missed.
            let arrival = self.inner.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let (delivered, next_visible) = self.take_visible(max, visibility);
            if !delivered.is_empty() {
                debug!(queue = %self.inner.queue_ref, count = delivered.len(), "received messages");
                return Ok(delivered);
            }

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                () = &mut arrival => {}
                () = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn change_visibility(
        &self,
        receipt_handle: &ReceiptHandle,
        timeout_seconds: i32,
    ) -> Result<ReceiptHandle> {
        validate_visibility_timeout(timeout_seconds)?;

        let now = Instant::now();
        let new_handle = {
            let mut messages = self.inner.messages.lock();
            let message = messages
                .iter_mut()
                .find(|m| m.receipt_handle.as_deref() == Some(receipt_handle.as_str()))
                .ok_or_else(|| QueueError::ReceiptHandleInvalid(receipt_handle.to_string()))?;

            if message.visible_at <= now {
                return Err(QueueError::MessageNotInFlight(receipt_handle.to_string()));
            }

            let handle = Uuid::new_v4().to_string();
            message.receipt_handle = Some(handle.clone());
            message.visible_at = now + seconds(timeout_seconds);
            handle
        };

        if timeout_seconds == 0 {
            self.inner.arrivals.notify_waiters();
        }

        debug!(queue = %self.inner.queue_ref, timeout_seconds, "visibility changed");
        Ok(ReceiptHandle::new(new_handle))
    }

    async fn delete(&self, receipt_handle: &ReceiptHandle) -> Result<()> {
        let mut messages = self.inner.messages.lock();
        let position = messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle.as_str()))
            .ok_or_else(|| QueueError::ReceiptHandleInvalid(receipt_handle.to_string()))?;
        messages.remove(position);

        debug!(queue = %self.inner.queue_ref, "message deleted");
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<String> {
        let message_id = Uuid::new_v4().to_string();
        self.push(message_id.clone(), body.to_string());
        Ok(message_id)
    }
}
