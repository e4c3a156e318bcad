use std::time::Duration;

use tracing::warn;

use crate::errors::{QueueError, Result};

/// Longest long-poll wait the service accepts, in seconds.
pub const MAX_WAIT_TIME_SECONDS: i32 = 20;

/// Largest batch a single receive call may return.
pub const MAX_NUMBER_OF_MESSAGES: i32 = 10;

/// Longest visibility timeout the service accepts (12 hours), in seconds.
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: i32 = 43_200;

/// Margin added to the wait time when no client timeout is given.
pub const DEFAULT_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Configuration for receiving messages from a queue.
///
/// Built through [`ReceiveConfig::builder`], which enforces that the
/// client-side timeout is strictly longer than the long-poll wait. A shorter
/// timeout would make an empty long poll look like a remote failure.
///
/// # Fields
/// - `max_number_of_messages`: The maximum number of messages to receive in a single request.
/// - `wait_time_seconds`: The wait time for long polling, in seconds.
/// - `visibility_timeout`: Optional visibility timeout applied to received messages.
/// - `client_timeout`: Client-side timeout of a single receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveConfig {
    max_number_of_messages: i32,
    wait_time_seconds: i32,
    visibility_timeout: Option<i32>,
    client_timeout: Duration,
}

impl ReceiveConfig {
    pub fn builder() -> ReceiveConfigBuilder {
        ReceiveConfigBuilder::default()
    }

    /// The maximum number of messages to receive in a single request.
    pub fn max_number_of_messages(&self) -> i32 {
        self.max_number_of_messages
    }

    /// The wait time for long polling, in seconds.
    pub fn wait_time_seconds(&self) -> i32 {
        self.wait_time_seconds
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_seconds.unsigned_abs().into())
    }

    pub fn visibility_timeout(&self) -> Option<i32> {
        self.visibility_timeout
    }

    pub fn client_timeout(&self) -> Duration {
        self.client_timeout
    }

    /// The same settings, limited to a single message per receive.
    pub fn single_message(&self) -> ReceiveConfig {
        ReceiveConfig {
            max_number_of_messages: 1,
            ..self.clone()
        }
    }
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        ReceiveConfig {
            max_number_of_messages: 1,
            wait_time_seconds: MAX_WAIT_TIME_SECONDS,
            visibility_timeout: None,
            client_timeout: Duration::from_secs(MAX_WAIT_TIME_SECONDS.unsigned_abs().into())
                + DEFAULT_TIMEOUT_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReceiveConfigBuilder {
    max_number_of_messages: Option<i32>,
    wait_time_seconds: Option<i32>,
    visibility_timeout: Option<i32>,
    client_timeout: Option<Duration>,
}

impl ReceiveConfigBuilder {
    pub fn max_number_of_messages(mut self, max: i32) -> Self {
        self.max_number_of_messages = Some(max);
        self
    }

    pub fn wait_time_seconds(mut self, seconds: i32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    pub fn visibility_timeout(mut self, seconds: i32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    pub fn client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = Some(timeout);
        self
    }

    /// Validates the settings and produces a [`ReceiveConfig`].
    ///
    /// Wait times above [`MAX_WAIT_TIME_SECONDS`] are capped, matching what
    /// the service does with them.
    pub fn build(self) -> Result<ReceiveConfig> {
        let max_number_of_messages = self.max_number_of_messages.unwrap_or(1);
        if !(1..=MAX_NUMBER_OF_MESSAGES).contains(&max_number_of_messages) {
            return Err(QueueError::invalid_config(format!(
                "max_number_of_messages must be between 1 and {MAX_NUMBER_OF_MESSAGES}, got {max_number_of_messages}"
            )));
        }

        let requested_wait = self.wait_time_seconds.unwrap_or(MAX_WAIT_TIME_SECONDS);
        if requested_wait < 0 {
            return Err(QueueError::invalid_config(format!(
                "wait_time_seconds must not be negative, got {requested_wait}"
            )));
        }
        let wait_time_seconds = if requested_wait > MAX_WAIT_TIME_SECONDS {
            warn!(
                requested = requested_wait,
                capped = MAX_WAIT_TIME_SECONDS,
                "long-poll wait time capped"
            );
            MAX_WAIT_TIME_SECONDS
        } else {
            requested_wait
        };

        if let Some(visibility) = self.visibility_timeout {
            validate_visibility_timeout(visibility)?;
        }

        let wait = Duration::from_secs(wait_time_seconds.unsigned_abs().into());
        let client_timeout = self
            .client_timeout
            .unwrap_or(wait + DEFAULT_TIMEOUT_MARGIN);
        if client_timeout <= wait {
            return Err(QueueError::invalid_config(format!(
                "client timeout {client_timeout:?} must be longer than the long-poll wait of {wait_time_seconds}s"
            )));
        }

        Ok(ReceiveConfig {
            max_number_of_messages,
            wait_time_seconds,
            visibility_timeout: self.visibility_timeout,
            client_timeout,
        })
    }
}

pub(crate) fn validate_visibility_timeout(seconds: i32) -> Result<()> {
    if (0..=MAX_VISIBILITY_TIMEOUT_SECONDS).contains(&seconds) {
        Ok(())
    } else {
        Err(QueueError::invalid_config(format!(
            "visibility timeout must be between 0 and {MAX_VISIBILITY_TIMEOUT_SECONDS} seconds, got {seconds}"
        )))
    }
}
