//! `sqs-cycle` - receive, extend visibility and acknowledge queue messages.

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clap::error::ErrorKind;
use sqs_receive_cycle::client::{create_sqs_client_for_receive, load_sdk_config};
use sqs_receive_cycle::memory::MemoryQueue;
use sqs_receive_cycle::queue::{MessageQueue, ReceiptHandle};
use sqs_receive_cycle::receiver::config::ReceiveConfig;
use sqs_receive_cycle::receiver::{CycleOutcome, ReceiveCycle};
use sqs_receive_cycle::redrive::RedrivePolicy;
use sqs_receive_cycle::sqs::SqsQueue;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sqs-cycle")]
#[command(about = "Long-poll, extend and acknowledge SQS messages", long_about = None)]
struct Args {
    /// AWS region, defaults to the ambient configuration
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Endpoint override, e.g. a local SQS emulator
    #[arg(long, global = true, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Receive at most one message without deleting it
    Receive {
        queue_url: String,
        #[arg(default_value_t = 20)]
        wait_seconds: i32,
    },
    /// Extend the visibility timeout of a received message
    Extend {
        queue_url: String,
        receipt_handle: String,
        timeout_seconds: i32,
    },
    /// Acknowledge (delete) a received message
    Ack {
        queue_url: String,
        receipt_handle: String,
    },
    /// Receive one message, optionally extend it, then acknowledge it
    Cycle {
        queue_url: String,
        #[arg(default_value_t = 20)]
        wait_seconds: i32,
        visibility_timeout: Option<i32>,
    },
    /// Send a message
    Send { queue_url: String, body: String },
    /// Attach a dead-letter queue (ARN or URL) through a redrive policy
    Redrive {
        queue_url: String,
        dead_letter_queue: String,
        max_receive_count: u32,
    },
    /// Run the full cycle against an in-memory queue
    Demo,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_error_status(e.kind()));
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("sqs_receive_cycle={0},sqs_cycle={0}", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = run(args).await;
    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
    }
    ExitCode::from(run_status(&result))
}

/// `--help` and `--version` succeed, every other argument error fails.
fn parse_error_status(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn run_status(result: &anyhow::Result<()>) -> u8 {
    if result.is_ok() { 0 } else { 1 }
}

async fn sqs_queue(args: &Args, queue_url: &str, config: &ReceiveConfig) -> SqsQueue {
    let sdk_config = load_sdk_config(args.region.as_deref(), args.endpoint_url.as_deref()).await;
    let client = create_sqs_client_for_receive(&sdk_config, config);
    SqsQueue::new(client, queue_url)
}

async fn run(args: Args) -> anyhow::Result<()> {
    match &args.command {
        Command::Receive {
            queue_url,
            wait_seconds,
        } => {
            let config = ReceiveConfig::builder()
                .wait_time_seconds(*wait_seconds)
                .build()?;
            let queue = sqs_queue(&args, queue_url, &config).await;
            let cycle = ReceiveCycle::new(queue, config);

            match cycle.receive_one().await.context("receive failed")? {
                Some(message) => {
                    println!("Message ID:     {}", message.message_id);
                    println!("Receipt handle: {}", message.receipt_handle);
                    println!("Body:           {}", message.body);
                }
                None => println!("No messages received."),
            }
        }
        Command::Extend {
            queue_url,
            receipt_handle,
            timeout_seconds,
        } => {
            let config = ReceiveConfig::default();
            let queue = sqs_queue(&args, queue_url, &config).await;
            let cycle = ReceiveCycle::new(queue, config);

            let receipt_handle = ReceiptHandle::new(receipt_handle.as_str());
            let handle = cycle
                .extend_visibility(&receipt_handle, *timeout_seconds)
                .await
                .context("visibility extension failed")?;
            println!("Visibility extended to {timeout_seconds}s.");
            println!("Receipt handle: {handle}");
        }
        Command::Ack {
            queue_url,
            receipt_handle,
        } => {
            let config = ReceiveConfig::default();
            let queue = sqs_queue(&args, queue_url, &config).await;
            let cycle = ReceiveCycle::new(queue, config);

            cycle
                .acknowledge(&ReceiptHandle::new(receipt_handle.as_str()))
                .await
                .context("acknowledge failed")?;
            println!("Message deleted.");
        }
        Command::Cycle {
            queue_url,
            wait_seconds,
            visibility_timeout,
        } => {
            let config = ReceiveConfig::builder()
                .wait_time_seconds(*wait_seconds)
                .build()?;
            let queue = sqs_queue(&args, queue_url, &config).await;
            let mut cycle = ReceiveCycle::new(queue, config);
            if let Some(seconds) = visibility_timeout {
                cycle = cycle.with_processing_timeout(*seconds)?;
            }

            let outcome = cycle
                .process_one(|message| async move {
                    println!("Received message {}: {}", message.message_id, message.body);
                    Ok(())
                })
                .await
                .context("receive cycle failed")?;
            print_outcome(&outcome);
        }
        Command::Send { queue_url, body } => {
            let config = ReceiveConfig::default();
            let queue = sqs_queue(&args, queue_url, &config).await;

            let message_id = queue.send(body).await.context("send failed")?;
            println!("Message sent, ID: {message_id}");
        }
        Command::Redrive {
            queue_url,
            dead_letter_queue,
            max_receive_count,
        } => {
            let config = ReceiveConfig::default();
            let queue = sqs_queue(&args, queue_url, &config).await;

            let dead_letter_arn = if dead_letter_queue.starts_with("arn:") {
                dead_letter_queue.clone()
            } else {
                sqs_queue(&args, dead_letter_queue, &config)
                    .await
                    .queue_arn()
                    .await
                    .context("looking up dead-letter queue ARN failed")?
            };
            let policy = RedrivePolicy::new(dead_letter_arn, *max_receive_count)?;

            queue
                .set_redrive_policy(&policy)
                .await
                .context("setting redrive policy failed")?;
            match queue
                .redrive_policy()
                .await
                .context("reading back redrive policy failed")?
            {
                Some(current) => println!(
                    "Redrive policy set on {queue_url}: dead-letter queue {}, maxReceiveCount {}.",
                    current.dead_letter_target_arn(),
                    current.max_receive_count()
                ),
                None => println!("Redrive policy set on {queue_url}."),
            }
        }
        Command::Demo => {
            for outcome in demo().await? {
                print_outcome(&outcome);
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Empty => println!("No messages received."),
        CycleOutcome::Acknowledged { message_id } => {
            println!("Message {message_id} processed and deleted.");
        }
        CycleOutcome::HandlerFailed { message_id, error } => {
            println!("Message {message_id} left on the queue: {error}");
        }
    }
}

/// Sends one message to an in-memory queue and runs two cycles: the first
/// acknowledges it, the second finds the queue empty.
async fn demo() -> anyhow::Result<Vec<CycleOutcome>> {
    let queue = MemoryQueue::new("demo");
    let config = ReceiveConfig::builder().wait_time_seconds(1).build()?;
    let cycle = ReceiveCycle::new(queue.clone(), config).with_processing_timeout(60)?;

    let message_id = queue.send("hello").await?;
    info!(%message_id, "demo message sent");

    let first = cycle
        .process_one(|message| async move {
            println!("Received message {}: {}", message.message_id, message.body);
            Ok(())
        })
        .await?;
    let second = cycle.process_one(|_| async { Ok(()) }).await?;
    Ok(vec![first, second])
}
