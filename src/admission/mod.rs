//! Admission control for publishers.
//!
//! An [`AdmissionGate`] is consulted once per publish call, before any
//! subscriber is looked up. A denial drops the message for every subscriber
//! of the topic; there is no queueing or retry.
//!
//! [`TokenBucket`] is the stock gate: a sustained rate in messages per second
//! plus a burst allowance, implemented with `governor`'s GCRA limiter. The
//! bucket starts full, so up to `burst` publishes are admitted immediately.

use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::utils::error::{PopcastError, Result};

/// Decides whether a publish call may proceed.
pub trait AdmissionGate: Send + Sync {
    fn allow(&self) -> bool;
}

impl<F> AdmissionGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn allow(&self) -> bool {
        self()
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionConfig {
    /// Sustained rate in messages per second.
    pub rate_per_sec: f64,
    /// Bucket size; the number of publishes admitted back to back.
    pub burst: u32,
}

impl AdmissionConfig {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            rate_per_sec,
            burst,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rate_per_sec.is_finite() || self.rate_per_sec <= 0.0 {
            return Err(PopcastError::InvalidAdmission(format!(
                "rate must be a positive number of messages per second, got {}",
                self.rate_per_sec
            )));
        }
        if self.burst == 0 {
            return Err(PopcastError::InvalidAdmission(
                "burst must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Time between two tokens at the sustained rate.
    fn replenish_period(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(1.0 / self.rate_per_sec)
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or_else(|| {
                PopcastError::InvalidAdmission(format!(
                    "rate {} has no representable replenish period",
                    self.rate_per_sec
                ))
            })
    }
}

/// Token-bucket admission gate.
pub struct TokenBucket {
    config: AdmissionConfig,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl TokenBucket {
    pub fn new(config: AdmissionConfig) -> Result<Self> {
        config.validate()?;

        let period = config.replenish_period()?;
        let burst = NonZeroU32::new(config.burst)
            .ok_or_else(|| PopcastError::InvalidAdmission("burst must be at least 1".into()))?;
        let quota = Quota::with_period(period)
            .ok_or_else(|| PopcastError::InvalidAdmission("zero replenish period".into()))?
            .allow_burst(burst);

        Ok(Self {
            config,
            limiter: RateLimiter::direct(quota),
        })
    }

    pub fn config(&self) -> AdmissionConfig {
        self.config
    }
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate_per_sec", &self.config.rate_per_sec)
            .field("burst", &self.config.burst)
            .finish()
    }
}

impl AdmissionGate for TokenBucket {
    fn allow(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
