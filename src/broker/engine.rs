//! Broadcast engine
//!
//! The engine ties the registry, the mailboxes and the optional admission
//! gate together:
//!
//! - `subscribe` creates a bounded mailbox and registers it under a topic
//! - `publish` asks the admission gate once, snapshots the topic's mailboxes
//!   under the registry's read lock, releases the lock, then fans the message
//!   out with a non-blocking enqueue per mailbox
//! - `unsubscribe` removes and closes one mailbox; unknown ids are ignored
//! - `shutdown` closes every mailbox and empties the registry
//!
//! Concurrency notes:
//! - An `Engine` is meant to be shared as `Arc<Engine<T>>` by any number of
//!   publisher and subscriber tasks. Every method takes `&self`.
//! - A full mailbox loses the incoming message for that subscriber only.
//!   Publishers never wait on subscriber consumption, only on the fan-out
//!   round of their own call.
//! - Fan-out is split into chunks of `fanout_chunk` mailboxes. A single chunk
//!   is delivered on the calling task; larger snapshots spawn one task per
//!   chunk and join them all before `publish` returns.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, trace, warn};

use crate::admission::{AdmissionConfig, AdmissionGate, TokenBucket};
use crate::broker::mailbox::{Delivery, Mailbox, MailboxId};
use crate::broker::stats::{EngineStats, PublishReport, StatsSnapshot};
use crate::broker::topic::{Registry, SharedSink};
use crate::config::Settings;
use crate::utils::error::{PopcastError, Result};

/// Messages each mailbox can hold before new ones are dropped.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

/// Mailboxes served by one delivery task.
pub const DEFAULT_FANOUT_CHUNK: usize = 64;

/// Construction parameters for an [`Engine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Slots in every mailbox created by `subscribe`.
    pub mailbox_capacity: usize,
    /// Mailboxes served by one delivery task during fan-out.
    pub fanout_chunk: usize,
    /// Token bucket for publishers; `None` admits everything.
    pub admission: Option<AdmissionConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            fanout_chunk: DEFAULT_FANOUT_CHUNK,
            admission: None,
        }
    }
}

impl EngineConfig {
    /// Reject zero capacity, zero chunk size and invalid admission settings.
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(PopcastError::InvalidCapacity(self.mailbox_capacity));
        }
        if self.fanout_chunk == 0 {
            return Err(PopcastError::InvalidFanout(self.fanout_chunk));
        }
        if let Some(admission) = &self.admission {
            admission.validate()?;
        }
        Ok(())
    }
}

/// Topic-based broadcast engine, shared as `Arc<Engine<T>>`.
pub struct Engine<T> {
    registry: Registry<T>,
    admission: Option<Box<dyn AdmissionGate>>,
    fanout_chunk: usize,
    stats: EngineStats,
}

impl<T: Clone + Send + 'static> Default for Engine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Engine<T> {
    /// Engine with default capacity and no admission gate.
    pub fn new() -> Self {
        Self::build(DEFAULT_MAILBOX_CAPACITY, DEFAULT_FANOUT_CHUNK, None)
    }

    /// Engine built from a validated [`EngineConfig`].
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let gate: Option<Box<dyn AdmissionGate>> = match config.admission {
            Some(admission) => Some(Box::new(TokenBucket::new(admission)?)),
            None => None,
        };
        Ok(Self::build(config.mailbox_capacity, config.fanout_chunk, gate))
    }

    /// Engine with default capacity whose publishers are rate limited.
    pub fn with_admission(admission: AdmissionConfig) -> Result<Self> {
        Self::with_config(EngineConfig {
            admission: Some(admission),
            ..EngineConfig::default()
        })
    }

    /// Engine guarded by a caller-supplied gate. `config.admission` is ignored.
    pub fn with_gate(config: EngineConfig, gate: impl AdmissionGate + 'static) -> Result<Self> {
        let config = EngineConfig {
            admission: None,
            ..config
        };
        config.validate()?;
        Ok(Self::build(
            config.mailbox_capacity,
            config.fanout_chunk,
            Some(Box::new(gate)),
        ))
    }

    /// Engine built from loaded [`Settings`].
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::with_config(settings.engine_config())
    }

    fn build(
        capacity: usize,
        fanout_chunk: usize,
        admission: Option<Box<dyn AdmissionGate>>,
    ) -> Self {
        Self {
            registry: Registry::new(capacity),
            admission,
            fanout_chunk,
            stats: EngineStats::default(),
        }
    }

    /// Subscribe to `topic`. The returned mailbox yields every message
    /// published to the topic from now on, minus any dropped while it was full.
    ///
    /// Dropping the mailbox does not unsubscribe it: the registry keeps the
    /// entry, and later publishes count it as a closed drop, until
    /// [`Engine::unsubscribe`] or [`Engine::shutdown`] removes it.
    pub fn subscribe(&self, topic: &str) -> Mailbox<T> {
        let mailbox = self.registry.subscribe(topic);
        self.stats.record_subscription();
        debug!(topic, mailbox = %mailbox.id(), "subscribed");
        mailbox
    }

    /// Remove a mailbox from `topic` and close it. Its consumer drains what is
    /// already queued and then sees end-of-stream. Unknown ids are a no-op.
    pub fn unsubscribe(&self, topic: &str, id: MailboxId) {
        if self.registry.unsubscribe(topic, id) {
            self.stats.record_closed(1);
            debug!(topic, mailbox = %id, "unsubscribed");
        } else {
            trace!(topic, mailbox = %id, "unsubscribe ignored, mailbox not registered");
        }
    }

    /// Broadcast `message` to every current subscriber of `topic`.
    ///
    /// Never blocks on a slow subscriber and never fails; the returned report
    /// only describes what happened.
    pub async fn publish(&self, topic: &str, message: T) -> PublishReport {
        if let Some(gate) = &self.admission {
            if !gate.allow() {
                self.stats.record_rate_limited();
                warn!(topic, "rate limit exceeded, dropping message");
                return PublishReport::rejected();
            }
        }
        self.stats.record_published();

        let recipients = self.registry.snapshot(topic);
        if recipients.is_empty() {
            trace!(topic, "no subscribers");
            return PublishReport::default();
        }

        let count = recipients.len();
        let mut report = fan_out(topic, recipients, message, self.fanout_chunk).await;
        report.recipients = count;

        self.stats.record_round(&report);
        report
    }

    /// Close every mailbox and forget every topic. Safe to call repeatedly and
    /// while publishes are in flight.
    pub fn shutdown(&self) {
        let closed = self.registry.shutdown();
        self.stats.record_closed(closed as u64);
        info!(closed, "broadcast engine shut down");
    }

    /// Topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.registry.topic_count()
    }

    /// Mailboxes registered under `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry.subscriber_count(topic)
    }

    /// Whether mailbox `id` is still registered under `topic`.
    pub fn is_subscribed(&self, topic: &str, id: MailboxId) -> bool {
        self.registry.contains(topic, id)
    }

    /// Names of the current topics, in no particular order.
    pub fn topics(&self) -> Vec<String> {
        self.registry.topics()
    }

    /// Capacity given to new mailboxes.
    pub fn mailbox_capacity(&self) -> usize {
        self.registry.capacity()
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

async fn fan_out<T>(
    topic: &str,
    recipients: Vec<SharedSink<T>>,
    message: T,
    chunk_size: usize,
) -> PublishReport
where
    T: Clone + Send + 'static,
{
    if recipients.len() <= chunk_size {
        return deliver_chunk(topic, &recipients, &message);
    }

    let topic: Arc<str> = Arc::from(topic);
    let mut sizes = Vec::new();
    let mut tasks = Vec::new();

    for chunk in recipients.chunks(chunk_size) {
        let chunk = chunk.to_vec();
        let message = message.clone();
        let topic = topic.clone();
        sizes.push(chunk.len());
        tasks.push(tokio::spawn(async move {
            deliver_chunk(&topic, &chunk, &message)
        }));
    }

    let mut report = PublishReport::default();
    for (idx, result) in join_all(tasks).await.into_iter().enumerate() {
        match result {
            Ok(chunk_report) => report.merge(chunk_report),
            Err(join_err) => {
                error!(topic = %topic, chunk = idx, "delivery task failed: {join_err}");
                report.failed += sizes[idx];
            }
        }
    }
    report
}

fn deliver_chunk<T: Clone>(topic: &str, sinks: &[SharedSink<T>], message: &T) -> PublishReport {
    let mut report = PublishReport::default();

    for sink in sinks {
        match sink.try_deliver(message.clone()) {
            Delivery::Delivered => report.delivered += 1,
            Delivery::Full => {
                report.dropped_full += 1;
                warn!(topic, mailbox = %sink.id(), "subscriber is too slow, dropping message");
            }
            Delivery::Closed => {
                report.dropped_closed += 1;
                debug!(topic, mailbox = %sink.id(), "mailbox closed, dropping message");
            }
        }
    }

    report
}
