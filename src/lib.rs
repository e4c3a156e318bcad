//! # SQS Receive Cycle
//!
//! The long-poll, visibility-extension and acknowledgment cycle of a
//! pull-based message queue consumer, over Amazon SQS or an in-memory queue.
//!
//! ## Features
//!
//! - Long polling with a client timeout that is always longer than the wait
//! - Receipt-handle based visibility extension and acknowledgment
//! - Empty receives reported as a normal result, not an error
//! - Trait-based queue backends: [`sqs::SqsQueue`] and [`memory::MemoryQueue`]
//! - Continuous receivers with shared resources and graceful shutdown
//! - Dead-letter redrive policy configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sqs_receive_cycle::client::{create_sqs_client_for_receive, load_sdk_config};
//! use sqs_receive_cycle::receiver::{ReceiveCycle, config::ReceiveConfig};
//! use sqs_receive_cycle::sqs::SqsQueue;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReceiveConfig::builder().wait_time_seconds(20).build()?;
//!     let sdk_config = load_sdk_config(None, None).await;
//!     let client = create_sqs_client_for_receive(&sdk_config, &config);
//!     let queue = SqsQueue::new(client, "https://sqs.region.amazonaws.com/account/queue-name");
//!
//!     let cycle = ReceiveCycle::new(queue, config);
//!     if let Some(message) = cycle.receive_one().await? {
//!         println!("Processing message: {}", message.body);
//!         let handle = cycle.extend_visibility(&message.receipt_handle, 60).await?;
//!         cycle.acknowledge(&handle).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod errors;
pub mod memory;
pub mod queue;
pub mod receiver;
pub mod redrive;
pub mod sqs;
