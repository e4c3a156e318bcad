//! [`MessageQueue`] backed by Amazon SQS.

use async_trait::async_trait;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName, QueueAttributeName};
use tracing::{debug, info, warn};

use crate::client::receive_timeout_config;
use crate::errors::{QueueError, Result};
use crate::queue::{MessageQueue, QueueRef, ReceiptHandle, ReceivedMessage};
use crate::receiver::config::{ReceiveConfig, validate_visibility_timeout};
use crate::redrive::RedrivePolicy;

/// An SQS client bound to one queue URL.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_ref: QueueRef,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<QueueRef>) -> Self {
        SqsQueue {
            client,
            queue_ref: queue_url.into(),
        }
    }

    pub fn client(&self) -> &aws_sdk_sqs::Client {
        &self.client
    }

    /// Looks up the queue's ARN, which redrive policies refer to.
    pub async fn queue_arn(&self) -> Result<String> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(self.queue_ref.as_str())
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|e| QueueError::service("GetQueueAttributes", e))?;

        output
            .attributes()
            .and_then(|attributes| attributes.get(&QueueAttributeName::QueueArn))
            .cloned()
            .ok_or_else(|| QueueError::Service {
                operation: "GetQueueAttributes",
                message: format!("no QueueArn returned for {}", self.queue_ref),
            })
    }

    /// Installs `policy` as the queue's `RedrivePolicy` attribute.
    pub async fn set_redrive_policy(&self, policy: &RedrivePolicy) -> Result<()> {
        let value = policy.to_attribute_value()?;

        self.client
            .set_queue_attributes()
            .queue_url(self.queue_ref.as_str())
            .attributes(QueueAttributeName::RedrivePolicy, value)
            .send()
            .await
            .map_err(|e| QueueError::service("SetQueueAttributes", e))?;

        info!(
            queue = %self.queue_ref,
            dead_letter_target_arn = policy.dead_letter_target_arn(),
            max_receive_count = policy.max_receive_count(),
            "redrive policy set"
        );
        Ok(())
    }

    /// Reads back the queue's `RedrivePolicy` attribute, if one is set.
    pub async fn redrive_policy(&self) -> Result<Option<RedrivePolicy>> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(self.queue_ref.as_str())
            .attribute_names(QueueAttributeName::RedrivePolicy)
            .send()
            .await
            .map_err(|e| QueueError::service("GetQueueAttributes", e))?;

        output
            .attributes()
            .and_then(|attributes| attributes.get(&QueueAttributeName::RedrivePolicy))
            .map(|value| RedrivePolicy::from_attribute_value(value))
            .transpose()
    }
}

fn into_received(message: Message) -> Option<ReceivedMessage> {
    let receive_count = message
        .attributes()
        .and_then(|attributes| attributes.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|count| count.parse().ok());

    let Some(receipt_handle) = message.receipt_handle else {
        warn!(message_id = ?message.message_id, "message without receipt handle skipped");
        return None;
    };

    Some(ReceivedMessage {
        message_id: message.message_id.unwrap_or_default(),
        receipt_handle: ReceiptHandle::new(receipt_handle),
        body: message.body.unwrap_or_default(),
        receive_count,
    })
}

#[async_trait]
impl MessageQueue for SqsQueue {
    fn queue_ref(&self) -> &QueueRef {
        &self.queue_ref
    }

    async fn receive(&self, config: &ReceiveConfig) -> Result<Vec<ReceivedMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(self.queue_ref.as_str())
            .max_number_of_messages(config.max_number_of_messages())
            .wait_time_seconds(config.wait_time_seconds())
            .set_visibility_timeout(config.visibility_timeout())
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .customize()
            // The attempt must outlast the long poll, whatever client this queue was built with.
            .config_override(
                aws_sdk_sqs::config::Builder::default()
                    .timeout_config(receive_timeout_config(config)),
            )
            .send()
            .await
            .map_err(|e| QueueError::service("ReceiveMessage", e))?;

        let messages: Vec<_> = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(into_received)
            .collect();

        debug!(queue = %self.queue_ref, count = messages.len(), "received messages");
        Ok(messages)
    }

    async fn change_visibility(
        &self,
        receipt_handle: &ReceiptHandle,
        timeout_seconds: i32,
    ) -> Result<ReceiptHandle> {
        validate_visibility_timeout(timeout_seconds)?;

        self.client
            .change_message_visibility()
            .queue_url(self.queue_ref.as_str())
            .receipt_handle(receipt_handle.as_str())
            .visibility_timeout(timeout_seconds)
            .send()
            .await
            .map_err(|err| {
                let service_error = err.as_service_error();
                if service_error.is_some_and(|e| e.is_receipt_handle_is_invalid()) {
                    QueueError::ReceiptHandleInvalid(receipt_handle.to_string())
                } else if service_error.is_some_and(|e| e.is_message_not_inflight()) {
                    QueueError::MessageNotInFlight(receipt_handle.to_string())
                } else {
                    QueueError::service("ChangeMessageVisibility", err)
                }
            })?;

        debug!(queue = %self.queue_ref, timeout_seconds, "visibility changed");
        // SQS keeps the handle valid across visibility changes.
        Ok(receipt_handle.clone())
    }

    async fn delete(&self, receipt_handle: &ReceiptHandle) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(self.queue_ref.as_str())
            .receipt_handle(receipt_handle.as_str())
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_receipt_handle_is_invalid())
                {
                    QueueError::ReceiptHandleInvalid(receipt_handle.to_string())
                } else {
                    QueueError::service("DeleteMessage", err)
                }
            })?;

        debug!(queue = %self.queue_ref, "message deleted");
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<String> {
        let output = self
            .client
            .send_message()
            .queue_url(self.queue_ref.as_str())
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::service("SendMessage", e))?;

        Ok(output.message_id.unwrap_or_default())
    }
}
