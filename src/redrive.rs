//! Dead-letter redrive policy attribute.
//!
//! The policy is a static queue attribute. Moving messages to the
//! dead-letter queue is done by the queue service, never by the receive cycle.

use serde::{Deserialize, Serialize};

use crate::errors::{QueueError, Result};

/// Largest `maxReceiveCount` the service accepts.
pub const MAX_RECEIVE_COUNT: u32 = 1_000;

/// `RedrivePolicy` queue attribute, serialized as SQS expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedrivePolicy {
    dead_letter_target_arn: String,
    max_receive_count: u32,
}

/// Checks `max_receive_count` against the range SQS accepts.
pub(crate) fn validate_max_receive_count(max_receive_count: u32) -> Result<()> {
    if !(1..=MAX_RECEIVE_COUNT).contains(&max_receive_count) {
        return Err(QueueError::invalid_config(format!(
            "maxReceiveCount must be between 1 and {MAX_RECEIVE_COUNT}, got {max_receive_count}"
        )));
    }
    Ok(())
}

impl RedrivePolicy {
    pub fn new(dead_letter_target_arn: impl Into<String>, max_receive_count: u32) -> Result<Self> {
        let dead_letter_target_arn = dead_letter_target_arn.into();
        if dead_letter_target_arn.is_empty() {
            return Err(QueueError::invalid_config(
                "dead-letter target ARN must not be empty",
            ));
        }
        validate_max_receive_count(max_receive_count)?;

        Ok(RedrivePolicy {
            dead_letter_target_arn,
            max_receive_count,
        })
    }

    pub fn dead_letter_target_arn(&self) -> &str {
        &self.dead_letter_target_arn
    }

    pub fn max_receive_count(&self) -> u32 {
        self.max_receive_count
    }

    /// Renders the attribute value for `SetQueueAttributes`.
    pub fn to_attribute_value(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| QueueError::invalid_config(format!("cannot encode redrive policy: {e}")))
    }

    /// Parses the attribute value returned by `GetQueueAttributes`.
    ///
    /// The service reports `maxReceiveCount` as a number, older tooling
    /// writes it as a string; both are accepted.
    pub fn from_attribute_value(value: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Count {
            Number(u32),
            Text(String),
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            dead_letter_target_arn: String,
            max_receive_count: Count,
        }

        let raw: Raw = serde_json::from_str(value)
            .map_err(|e| QueueError::invalid_config(format!("malformed redrive policy: {e}")))?;
        let count = match raw.max_receive_count {
            Count::Number(n) => n,
            Count::Text(s) => s.parse().map_err(|_| {
                QueueError::invalid_config(format!("maxReceiveCount is not a number: {s}"))
            })?,
        };

        RedrivePolicy::new(raw.dead_letter_target_arn, count)
    }
}
