pub mod engine;
pub mod mailbox;
pub mod stats;
pub mod topic;

pub use engine::{DEFAULT_FANOUT_CHUNK, DEFAULT_MAILBOX_CAPACITY, Engine, EngineConfig};
pub use mailbox::{Delivery, Mailbox, MailboxId, MailboxSink};
pub use stats::{PublishReport, StatsSnapshot};

#[cfg(test)]
mod tests;
