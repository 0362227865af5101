//! Topic management
//!
//! A `Topic` holds the mailboxes currently subscribed under one topic name.
//! The `Registry` maps topic names to topics behind a single reader/writer
//! lock:
//!
//! - subscribe, unsubscribe and shutdown take the write lock
//! - `snapshot` takes the read lock and releases it before returning, so no
//!   caller ever delivers while holding the registry lock
//!
//! A topic exists only while it has at least one mailbox; removing the last
//! one removes the topic entry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::broker::mailbox::{self, Mailbox, MailboxId, MailboxSink};

pub type SharedSink<T> = Arc<dyn MailboxSink<T>>;

pub struct Topic<T> {
    pub name: Arc<str>,
    subscribers: HashMap<MailboxId, SharedSink<T>>,
}

impl<T> Topic<T> {
    /// Create a new, empty topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            subscribers: HashMap::new(),
        }
    }

    /// Add a mailbox to the topic. Re-adding the same id replaces it.
    pub fn subscribe(&mut self, sink: SharedSink<T>) {
        self.subscribers.insert(sink.id(), sink);
    }

    /// Remove a mailbox from the topic, returning it if it was present.
    pub fn unsubscribe(&mut self, id: &MailboxId) -> Option<SharedSink<T>> {
        self.subscribers.remove(id)
    }

    pub fn contains(&self, id: &MailboxId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Current members, in no particular order.
    pub fn snapshot(&self) -> Vec<SharedSink<T>> {
        self.subscribers.values().cloned().collect()
    }

    fn drain(&mut self) -> impl Iterator<Item = SharedSink<T>> + '_ {
        self.subscribers.drain().map(|(_, sink)| sink)
    }
}

/// Topic name -> subscribed mailboxes.
pub struct Registry<T> {
    topics: RwLock<HashMap<Arc<str>, Topic<T>>>,
    capacity: usize,
}

impl<T: Send + 'static> Registry<T> {
    /// Create an empty registry whose mailboxes hold `capacity` messages each.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create a mailbox and register it under `topic`, creating the topic on
    /// first use.
    pub fn subscribe(&self, topic: &str) -> Mailbox<T> {
        let mut topics = self.topics.write();
        let entry = topics
            .entry(Arc::from(topic))
            .or_insert_with(|| Topic::new(topic));

        let (sender, mailbox) = mailbox::channel(entry.name.clone(), self.capacity);
        entry.subscribe(sender);
        mailbox
    }

    /// Remove `id` from `topic` and close it.
    ///
    /// Returns `false` without side effects when the mailbox is not registered
    /// under that topic, which makes repeated calls harmless.
    pub fn unsubscribe(&self, topic: &str, id: MailboxId) -> bool {
        let mut topics = self.topics.write();
        let Some(entry) = topics.get_mut(topic) else {
            return false;
        };

        let removed = entry.unsubscribe(&id);
        if entry.is_empty() {
            topics.remove(topic);
        }

        match removed {
            Some(sink) => {
                sink.close();
                true
            }
            None => false,
        }
    }

    /// Current mailboxes of `topic`. The lock is released before returning, so
    /// the result may already be stale when the caller uses it.
    pub fn snapshot(&self, topic: &str) -> Vec<SharedSink<T>> {
        self.topics
            .read()
            .get(topic)
            .map(Topic::snapshot)
            .unwrap_or_default()
    }

    /// Close every mailbox of every topic and empty the registry.
    ///
    /// Returns how many mailboxes this call closed; a second call returns 0.
    pub fn shutdown(&self) -> usize {
        let mut topics = self.topics.write();
        let mut closed = 0;
        for (_, mut topic) in topics.drain() {
            for sink in topic.drain() {
                if sink.close() {
                    closed += 1;
                }
            }
        }
        closed
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Topic::len)
    }

    pub fn contains(&self, topic: &str, id: MailboxId) -> bool {
        self.topics
            .read()
            .get(topic)
            .is_some_and(|t| t.contains(&id))
    }

    /// Names of all topics that currently have subscribers.
    pub fn topics(&self) -> Vec<String> {
        self.topics.read().keys().map(|k| k.to_string()).collect()
    }
}
