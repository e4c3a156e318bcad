//! Tests against a real SQS queue.
//!
//! Run with `TEST_SQS_QUEUE_URL` set (a `.env` file works) and `--ignored`.

use sqs_receive_cycle::client::{create_sqs_client_for_receive, load_sdk_config};
use sqs_receive_cycle::errors::QueueError;
use sqs_receive_cycle::queue::MessageQueue;
use sqs_receive_cycle::receiver::{self, ReceiveCycle, config::ReceiveConfig};
use sqs_receive_cycle::sqs::SqsQueue;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Clone)]
struct SharedCounter {
    count: Arc<Mutex<i32>>,
}

impl SharedCounter {
    fn new() -> Self {
        Self {
            count: Arc::new(Mutex::new(0)),
        }
    }

    async fn increment(&self) {
        let mut count = self.count.lock().await;
        *count += 1;
    }

    async fn get_count(&self) -> i32 {
        *self.count.lock().await
    }
}

async fn test_handler(message: String, shared: SharedCounter) -> Result<(), QueueError> {
    println!("Received message: {}", message);
    shared.increment().await;
    Ok(())
}

async fn test_queue(config: &ReceiveConfig) -> SqsQueue {
    dotenvy::dotenv().ok();

    let queue_url = env::var("TEST_SQS_QUEUE_URL").expect("TEST_SQS_QUEUE_URL must be set");
    let sdk_config = load_sdk_config(None, None).await;
    SqsQueue::new(create_sqs_client_for_receive(&sdk_config, config), queue_url)
}

async fn purge(queue: &SqsQueue) {
    let purge_result = queue
        .client()
        .purge_queue()
        .queue_url(queue.queue_ref().as_str())
        .send()
        .await;

    if let Err(e) = purge_result {
        println!("Warning: Failed to purge queue: {}", e);
    }
}

#[tokio::test]
#[ignore = "requires TEST_SQS_QUEUE_URL and AWS credentials"]
async fn test_receive_extend_acknowledge() {
    let config = ReceiveConfig::builder()
        .wait_time_seconds(10)
        .build()
        .unwrap();
    let queue = test_queue(&config).await;
    queue
        .send("Cycle test message")
        .await
        .expect("Failed to send test message");

    let cycle = ReceiveCycle::new(queue.clone(), config);
    let message = cycle
        .receive_one()
        .await
        .expect("receive failed")
        .expect("message should arrive within the wait time");
    assert_eq!(message.body, "Cycle test message");

    let handle = cycle
        .extend_visibility(&message.receipt_handle, 60)
        .await
        .expect("visibility extension failed");
    cycle.acknowledge(&handle).await.expect("acknowledge failed");

    purge(&queue).await;
}

#[tokio::test]
#[ignore = "requires TEST_SQS_QUEUE_URL and AWS credentials"]
async fn test_empty_long_poll_is_not_an_error() {
    let config = ReceiveConfig::builder()
        .wait_time_seconds(2)
        .build()
        .unwrap();
    let queue = test_queue(&config).await;
    purge(&queue).await;

    let cycle = ReceiveCycle::new(queue, config);
    assert!(cycle.receive().await.expect("empty poll failed").is_empty());
}

#[tokio::test]
#[ignore = "requires TEST_SQS_QUEUE_URL and AWS credentials"]
async fn test_aws_sqs_receiver_with_shutdown() {
    let config = ReceiveConfig::builder()
        .max_number_of_messages(10)
        .wait_time_seconds(5)
        .build()
        .unwrap();
    let queue = test_queue(&config).await;

    queue
        .send("Shutdown test message")
        .await
        .expect("Failed to send test message");

    let shared_counter = SharedCounter::new();
    let counter_clone = shared_counter.clone();

    let mut receiver = receiver::AwsSqsReceiver::new();
    receiver.add_handler_fn(
        queue.queue_ref().as_str(),
        test_handler,
        counter_clone,
        Some(config),
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let client_clone = queue.client().clone();
    let receive_task = tokio::spawn(async move {
        receiver
            .start_all_handlers_with_shutdown(client_clone, shutdown_rx)
            .await
    });

    let processed = timeout(Duration::from_secs(30), async {
        while shared_counter.get_count().await < 1 {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    })
    .await;

    // Send shutdown signal
    println!("Sending shutdown signal...");
    let _ = shutdown_tx.send(());

    let shutdown_result = timeout(Duration::from_secs(10), receive_task).await;
    assert!(
        shutdown_result.is_ok(),
        "Shutdown test timed out - handlers did not shut down gracefully"
    );

    let final_count = shared_counter.get_count().await;
    println!("Messages processed before shutdown: {}", final_count);
    assert!(
        processed.is_ok() && final_count >= 1,
        "Should have processed at least 1 message before shutdown"
    );

    purge(&queue).await;
}

#[tokio::test]
#[ignore = "requires TEST_SQS_QUEUE_URL and AWS credentials"]
async fn test_start_receive_queue() {
    let config = ReceiveConfig::default();
    let queue = test_queue(&config).await;

    queue
        .send("Test message 1")
        .await
        .expect("Failed to send test message 1");

    let shared_counter = SharedCounter::new();
    let counter_clone = shared_counter.clone();

    let client_clone = queue.client().clone();
    let queue_url = queue.queue_ref().to_string();
    let receive_task = tokio::spawn(async move {
        receiver::start_receive_queue(client_clone, &queue_url, counter_clone, test_handler).await
    });

    let timeout_result = timeout(Duration::from_secs(30), async {
        while shared_counter.get_count().await < 1 {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    })
    .await;

    receive_task.abort();

    assert!(
        timeout_result.is_ok(),
        "Test timed out. Only processed {} messages",
        shared_counter.get_count().await
    );
}
