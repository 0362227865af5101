//! The `error` module defines the error type used within `popcast`.
//!
//! Errors only arise while building an engine from configuration. Once an
//! `Engine` exists, subscribe/publish/unsubscribe/shutdown are infallible and
//! every failure mode (full mailbox, rate limit, closed mailbox) is absorbed
//! as a counted drop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PopcastError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid admission settings: {0}")]
    InvalidAdmission(String),

    #[error("mailbox capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    #[error("fan-out chunk size must be at least 1, got {0}")]
    InvalidFanout(usize),
}

pub type Result<T> = std::result::Result<T, PopcastError>;
