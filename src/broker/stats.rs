use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for one engine.
///
/// Drops are reported here and through `tracing`; they are never surfaced as
/// errors to publishers.
#[derive(Debug, Default)]
pub struct EngineStats {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped_full: AtomicU64,
    dropped_closed: AtomicU64,
    rate_limited: AtomicU64,
    subscriptions: AtomicU64,
    closed: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Publish calls admitted past the rate limiter.
    pub published: u64,
    /// Messages enqueued into a mailbox.
    pub delivered: u64,
    /// Per-subscriber drops because the mailbox was full.
    pub dropped_full: u64,
    /// Per-subscriber drops because the mailbox was already closed.
    pub dropped_closed: u64,
    /// Publish calls rejected by the admission gate.
    pub rate_limited: u64,
    pub subscriptions: u64,
    /// Mailboxes closed by unsubscribe or shutdown.
    pub closed: u64,
}

impl StatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_full + self.dropped_closed
    }
}

impl EngineStats {
    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_round(&self, report: &PublishReport) {
        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped_full
            .fetch_add(report.dropped_full as u64, Ordering::Relaxed);
        self.dropped_closed
            .fetch_add(report.dropped_closed as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_subscription(&self) {
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self, count: u64) {
        self.closed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
        }
    }
}

/// What happened during one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// The admission gate rejected the call; nothing was attempted.
    pub rate_limited: bool,
    /// Mailboxes in the snapshot.
    pub recipients: usize,
    pub delivered: usize,
    pub dropped_full: usize,
    pub dropped_closed: usize,
    /// Recipients whose delivery task failed before reporting back.
    pub failed: usize,
}

impl PublishReport {
    pub(crate) fn rejected() -> Self {
        Self {
            rate_limited: true,
            ..Self::default()
        }
    }

    pub(crate) fn merge(&mut self, other: PublishReport) {
        self.delivered += other.delivered;
        self.dropped_full += other.dropped_full;
        self.dropped_closed += other.dropped_closed;
        self.failed += other.failed;
    }

    pub fn dropped(&self) -> usize {
        self.dropped_full + self.dropped_closed
    }
}
