//! Demo scenarios for PopCast
//!
//! Subcommands:
//! - `basic`: two subscribers, two messages, clean shutdown
//! - `slow-subscriber`: a fast and a slow consumer on the same topic
//! - `contention`: several publishers racing against unsubscribe/shutdown
//! - `rate-limited`: publishers throttled by the admission gate

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::future::join_all;
use popcast::config::{Settings, load_config};
use popcast::utils::logging;
use popcast::{Engine, Mailbox};
use tokio::task::JoinHandle;
use tracing::{error, info};

const TOPIC: &str = "news";

#[derive(Parser)]
#[command(name = "popcast", about = "In-process broadcast engine demos")]
struct Cli {
    /// Override the configured mailbox capacity
    #[arg(long, global = true)]
    capacity: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Two subscribers receive two messages, then everything shuts down
    Basic,
    /// One fast and one slow subscriber share a topic
    SlowSubscriber,
    /// Three publishers and five subscribers, then unsubscribe and shutdown
    Contention,
    /// Publish faster than the admission gate allows
    RateLimited {
        /// Sustained publishes per second
        #[arg(long, default_value_t = 5.0)]
        rate: f64,
        /// Publishes admitted back to back
        #[arg(long, default_value_t = 10)]
        burst: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging.level);

    if let Some(capacity) = cli.capacity {
        settings.broker.mailbox_capacity = capacity;
    }

    let result = match cli.command {
        Command::Basic => run_basic(&settings).await,
        Command::SlowSubscriber => run_slow_subscriber(&settings).await,
        Command::Contention => run_contention(&settings).await,
        Command::RateLimited { rate, burst } => {
            settings.admission.enabled = true;
            settings.admission.rate_per_sec = rate;
            settings.admission.burst = burst;
            run_rate_limited(&settings).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Scenario failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Drain `mailbox` until end-of-stream, optionally pausing after each message.
/// Resolves to the number of messages received.
fn spawn_consumer(
    name: String,
    mut mailbox: Mailbox<String>,
    delay: Option<Duration>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut received = 0;
        while let Some(msg) = mailbox.recv().await {
            received += 1;
            info!("{name} received: {msg}");
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
        info!("{name} reached end of stream after {received} messages");
        received
    })
}

async fn finish(engine: &Engine<String>, consumers: Vec<JoinHandle<usize>>) {
    engine.shutdown();
    join_all(consumers).await;

    let stats = engine.stats();
    info!(
        published = stats.published,
        delivered = stats.delivered,
        dropped_full = stats.dropped_full,
        rate_limited = stats.rate_limited,
        "Broadcast engine shut down gracefully"
    );
}

async fn run_basic(settings: &Settings) -> popcast::Result<()> {
    let engine = Engine::<String>::from_settings(settings)?;

    let subscribers = [engine.subscribe(TOPIC), engine.subscribe(TOPIC)];
    let ids: Vec<_> = subscribers.iter().map(Mailbox::id).collect();
    let consumers = subscribers
        .into_iter()
        .enumerate()
        .map(|(i, mailbox)| spawn_consumer(format!("Subscriber {}", i + 1), mailbox, None))
        .collect();

    engine
        .publish(TOPIC, "Breaking News: Rust is awesome!".to_string())
        .await;
    engine.publish(TOPIC, "Another update!".to_string()).await;

    for id in ids {
        engine.unsubscribe(TOPIC, id);
    }
    finish(&engine, consumers).await;
    Ok(())
}

async fn run_slow_subscriber(settings: &Settings) -> popcast::Result<()> {
    let engine = Engine::<String>::from_settings(settings)?;

    let fast = engine.subscribe(TOPIC);
    let slow = engine.subscribe(TOPIC);
    let ids = [fast.id(), slow.id()];
    let consumers = vec![
        spawn_consumer("Fast subscriber".to_string(), fast, None),
        spawn_consumer(
            "Slow subscriber".to_string(),
            slow,
            Some(Duration::from_millis(200)),
        ),
    ];

    for i in 0..20 {
        engine.publish(TOPIC, format!("Message {i}")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    for id in ids {
        engine.unsubscribe(TOPIC, id);
    }
    finish(&engine, consumers).await;
    Ok(())
}

async fn run_contention(settings: &Settings) -> popcast::Result<()> {
    const PUBLISHERS: usize = 3;
    const SUBSCRIBERS: usize = 5;
    const MESSAGES: usize = 20;

    let engine = Arc::new(Engine::<String>::from_settings(settings)?);

    let mut ids = Vec::with_capacity(SUBSCRIBERS);
    let mut consumers = Vec::with_capacity(SUBSCRIBERS);
    for i in 0..SUBSCRIBERS {
        let mailbox = engine.subscribe(TOPIC);
        ids.push(mailbox.id());
        consumers.push(spawn_consumer(format!("Subscriber {i}"), mailbox, None));
    }

    let publishers = (0..PUBLISHERS).map(|p| {
        let engine = engine.clone();
        tokio::spawn(async move {
            for j in 0..MESSAGES {
                engine.publish(TOPIC, format!("Publisher {p}: Message {j}")).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
    });
    join_all(publishers).await;

    for (i, id) in ids.into_iter().enumerate() {
        info!("Unsubscribing Subscriber {i}");
        engine.unsubscribe(TOPIC, id);
    }
    finish(&engine, consumers).await;
    Ok(())
}

async fn run_rate_limited(settings: &Settings) -> popcast::Result<()> {
    let engine = Engine::<String>::from_settings(settings)?;

    let mailbox = engine.subscribe(TOPIC);
    let id = mailbox.id();
    let consumers = vec![spawn_consumer("Subscriber".to_string(), mailbox, None)];

    for i in 0..20 {
        engine.publish(TOPIC, format!("Message {i}")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    engine.unsubscribe(TOPIC, id);
    finish(&engine, consumers).await;
    Ok(())
}
