//! # PopCast
//!
//! `popcast` is an in-process publish/subscribe broadcast engine built on
//! tokio. Publishers post messages to named topics and every mailbox
//! subscribed to that topic receives its own copy.
//!
//! Delivery is best effort and at most once:
//!
//! - each subscriber has a bounded mailbox; when it is full the incoming
//!   message is dropped for that subscriber only
//! - an optional token-bucket admission gate can drop whole publish calls
//! - closing a mailbox (unsubscribe or shutdown) ends its stream once the
//!   queued messages have been drained
//!
//! ## Core Modules
//!
//! - `broker`: the engine, topic registry and mailboxes.
//! - `admission`: the rate limiter consulted once per publish.
//! - `config`: loads engine settings from file and environment.
//! - `utils`: error type and logging setup.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use popcast::Engine;
//!
//! # async fn demo() {
//! let engine = Arc::new(Engine::<String>::new());
//! let mut inbox = engine.subscribe("news");
//!
//! engine.publish("news", "hello".to_string()).await;
//! assert_eq!(inbox.recv().await.as_deref(), Some("hello"));
//!
//! engine.unsubscribe("news", inbox.id());
//! assert_eq!(inbox.recv().await, None);
//! # }
//! ```

pub mod admission;
pub mod broker;
pub mod config;
pub mod utils;

pub use admission::{AdmissionConfig, AdmissionGate, TokenBucket};
pub use broker::{Engine, EngineConfig, Mailbox, MailboxId, PublishReport, StatsSnapshot};
pub use utils::error::{PopcastError, Result};
