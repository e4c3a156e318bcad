use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqs_receive_cycle::errors::{GenericError, QueueError};
use sqs_receive_cycle::memory::MemoryQueue;
use sqs_receive_cycle::queue::{MessageQueue, QueueRef, ReceiptHandle, ReceivedMessage};
use sqs_receive_cycle::receiver::{self, RECEIVE_ERROR_PAUSE, config::ReceiveConfig};
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

fn loop_config() -> ReceiveConfig {
    ReceiveConfig::builder()
        .max_number_of_messages(10)
        .wait_time_seconds(1)
        .visibility_timeout(2)
        .build()
        .unwrap()
}

async fn wait_for_count(counter: &SharedCounter, expected: i32) {
    timeout(Duration::from_secs(30), async {
        while counter.get_count().await < expected {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("handlers did not reach the expected count");
}

#[tokio::test(start_paused = true)]
async fn processes_and_deletes_messages_until_shutdown() {
    let queue = MemoryQueue::new("loop");
    queue.send("Test message 1").await.unwrap();
    queue.send("Test message 2").await.unwrap();

    let shared_counter = SharedCounter::new();
    let mut receiver = receiver::AwsSqsReceiver::new();
    receiver.add_handler_fn(
        queue.queue_ref().as_str(),
        test_handler,
        shared_counter.clone(),
        Some(loop_config()),
    );
    assert_eq!(receiver.handler_count(), 1);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let backend = queue.clone();
    let receive_task = tokio::spawn(async move {
        receiver
            .start_all_handlers_with(
                move |_url: &str| -> Arc<dyn MessageQueue> { Arc::new(backend.clone()) },
                shutdown_rx,
            )
            .await
    });

    wait_for_count(&shared_counter, 2).await;
    let _ = shutdown_tx.send(());

    timeout(Duration::from_secs(10), receive_task)
        .await
        .expect("receiver did not shut down")
        .expect("receiver task panicked");

    assert_eq!(shared_counter.get_count().await, 2);
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_messages_stay_on_the_queue() {
    let queue = MemoryQueue::new("failing");
    queue.send("bad").await.unwrap();

    let attempts = SharedCounter::new();
    let mut receiver = receiver::AwsSqsReceiver::new();
    receiver.add_handler_fn(
        queue.queue_ref().as_str(),
        |message: String, shared: SharedCounter| async move {
            shared.increment().await;
            Err(QueueError::from(GenericError::new(format!(
                "rejected {message}"
            ))))
        },
        attempts.clone(),
        Some(loop_config()),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let backend = queue.clone();
    let receive_task = tokio::spawn(async move {
        receiver
            .start_all_handlers_with(
                move |_url: &str| -> Arc<dyn MessageQueue> { Arc::new(backend.clone()) },
                shutdown_rx,
            )
            .await
    });

    // Redelivered after each visibility timeout lapses.
    wait_for_count(&attempts, 2).await;
    drop(shutdown_tx);

    timeout(Duration::from_secs(10), receive_task)
        .await
        .expect("receiver did not shut down")
        .expect("receiver task panicked");

    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn each_queue_gets_its_own_handler() {
    let orders = MemoryQueue::new("orders");
    let invoices = MemoryQueue::new("invoices");
    orders.send("order-1").await.unwrap();
    invoices.send("invoice-1").await.unwrap();
    invoices.send("invoice-2").await.unwrap();

    let order_count = SharedCounter::new();
    let invoice_count = SharedCounter::new();
    let mut receiver = receiver::AwsSqsReceiver::new();
    receiver.add_handler_fn(
        orders.queue_ref().as_str(),
        test_handler,
        order_count.clone(),
        Some(loop_config()),
    );
    receiver.add_handler_fn(
        invoices.queue_ref().as_str(),
        test_handler,
        invoice_count.clone(),
        Some(loop_config()),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let (orders_backend, invoices_backend) = (orders.clone(), invoices.clone());
    let receive_task = tokio::spawn(async move {
        receiver
            .start_all_handlers_with(
                move |url: &str| -> Arc<dyn MessageQueue> {
                    if url == orders_backend.queue_ref().as_str() {
                        Arc::new(orders_backend.clone())
                    } else {
                        Arc::new(invoices_backend.clone())
                    }
                },
                shutdown_rx,
            )
            .await
    });

    wait_for_count(&order_count, 1).await;
    wait_for_count(&invoice_count, 2).await;
    let _ = shutdown_tx.send(());
    receive_task.await.unwrap();

    assert!(orders.is_empty());
    assert!(invoices.is_empty());
}

/// A backend whose receive always fails.
struct UnavailableQueue {
    queue_ref: QueueRef,
    receive_calls: AtomicUsize,
}

impl UnavailableQueue {
    fn unavailable() -> QueueError {
        QueueError::Service {
            operation: "ReceiveMessage",
            message: "service unavailable".to_string(),
        }
    }
}

#[async_trait]
impl MessageQueue for UnavailableQueue {
    fn queue_ref(&self) -> &QueueRef {
        &self.queue_ref
    }

    async fn receive(&self, _config: &ReceiveConfig) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        Err(Self::unavailable())
    }

    async fn change_visibility(
        &self,
        _receipt_handle: &ReceiptHandle,
        _timeout_seconds: i32,
    ) -> Result<ReceiptHandle, QueueError> {
        Err(Self::unavailable())
    }

    async fn delete(&self, _receipt_handle: &ReceiptHandle) -> Result<(), QueueError> {
        Err(Self::unavailable())
    }

    async fn send(&self, _body: &str) -> Result<String, QueueError> {
        Err(Self::unavailable())
    }
}

#[tokio::test(start_paused = true)]
async fn receive_errors_pause_between_polls_and_honor_shutdown() {
    let backend = Arc::new(UnavailableQueue {
        queue_ref: QueueRef::new("unavailable://orders"),
        receive_calls: AtomicUsize::new(0),
    });

    let mut receiver = receiver::AwsSqsReceiver::new();
    receiver.add_handler_fn(
        "unavailable://orders",
        test_handler,
        SharedCounter::new(),
        Some(loop_config()),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let queue = backend.clone();
    let receive_task = tokio::spawn(async move {
        receiver
            .start_all_handlers_with(
                move |_url: &str| -> Arc<dyn MessageQueue> { queue.clone() },
                shutdown_rx,
            )
            .await
    });

    tokio::time::sleep(RECEIVE_ERROR_PAUSE * 10 + RECEIVE_ERROR_PAUSE / 2).await;
    let calls = backend.receive_calls.load(Ordering::SeqCst);
    assert!((2..=12).contains(&calls), "unexpected receive count {calls}");

    let stopping = tokio::time::Instant::now();
    let _ = shutdown_tx.send(());
    timeout(Duration::from_secs(10), receive_task)
        .await
        .expect("receiver did not shut down")
        .expect("receiver task panicked");

    assert!(stopping.elapsed() < RECEIVE_ERROR_PAUSE);
    assert_eq!(backend.receive_calls.load(Ordering::SeqCst), calls);
}
