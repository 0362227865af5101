use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::timeout;

use super::mailbox::{MailboxSink, TryRecvError};
use super::topic::{Registry, Topic};
use super::{Engine, EngineConfig};
use crate::admission::AdmissionConfig;

fn small_engine(capacity: usize, fanout_chunk: usize) -> Engine<u32> {
    Engine::with_config(EngineConfig {
        mailbox_capacity: capacity,
        fanout_chunk,
        admission: None,
    })
    .unwrap()
}

fn drain<T>(mailbox: &mut super::Mailbox<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(msg) = mailbox.try_recv() {
        out.push(msg);
    }
    out
}

#[test]
fn test_topic_new() {
    let topic = Topic::<u32>::new("test_topic");
    assert_eq!(&*topic.name, "test_topic");
    assert!(topic.is_empty());
}

#[test]
fn test_topic_subscribe_and_unsubscribe() {
    let registry = Registry::<u32>::new(4);
    let mailbox = registry.subscribe("test_topic");
    let sink = registry.snapshot("test_topic").pop().unwrap();

    let mut topic = Topic::<u32>::new("other");
    topic.subscribe(sink.clone());
    assert!(topic.contains(&mailbox.id()));
    assert_eq!(topic.len(), 1);

    assert!(topic.unsubscribe(&mailbox.id()).is_some());
    assert!(topic.unsubscribe(&mailbox.id()).is_none());
    assert!(topic.is_empty());
}

#[test]
fn test_registry_creates_topic_on_first_subscribe() {
    let registry = Registry::<u32>::new(4);
    assert_eq!(registry.topic_count(), 0);

    let a = registry.subscribe("alpha");
    let b = registry.subscribe("alpha");
    assert_ne!(a.id(), b.id());
    assert_eq!(a.topic(), "alpha");
    assert_eq!(a.capacity(), 4);
    assert_eq!(registry.topic_count(), 1);
    assert_eq!(registry.subscriber_count("alpha"), 2);
}

#[test]
fn test_registry_removes_empty_topic() {
    let registry = Registry::<u32>::new(4);
    let a = registry.subscribe("alpha");
    let b = registry.subscribe("alpha");

    assert!(registry.unsubscribe("alpha", a.id()));
    assert_eq!(registry.topics(), vec!["alpha".to_string()]);

    assert!(registry.unsubscribe("alpha", b.id()));
    assert_eq!(registry.topic_count(), 0);
    assert!(registry.snapshot("alpha").is_empty());
}

#[test]
fn test_registry_unsubscribe_is_idempotent() {
    let registry = Registry::<u32>::new(4);
    let a = registry.subscribe("alpha");
    let b = registry.subscribe("alpha");

    assert!(registry.unsubscribe("alpha", a.id()));
    assert!(!registry.unsubscribe("alpha", a.id()));
    // wrong topic for a live mailbox leaves it alone
    assert!(!registry.unsubscribe("beta", b.id()));
    assert!(registry.contains("alpha", b.id()));
    assert!(!b.is_closed());
}

#[test]
fn test_registry_snapshot_survives_unsubscribe() {
    let registry = Registry::<u32>::new(4);
    let mut mailbox = registry.subscribe("alpha");

    let snapshot = registry.snapshot("alpha");
    registry.unsubscribe("alpha", mailbox.id());

    // stale snapshot entry is closed, so delivery degrades to a drop
    let sink = &snapshot[0];
    assert!(sink.is_closed());
    assert_eq!(sink.try_deliver(1), super::Delivery::Closed);
    assert_eq!(mailbox.try_recv(), Err(TryRecvError::Disconnected));
}

#[test]
fn test_registry_shutdown_closes_each_mailbox_once() {
    let registry = Registry::<u32>::new(4);
    let a = registry.subscribe("alpha");
    let b = registry.subscribe("beta");
    let c = registry.subscribe("beta");

    assert_eq!(registry.shutdown(), 3);
    assert_eq!(registry.shutdown(), 0);
    assert_eq!(registry.topic_count(), 0);
    assert!(a.is_closed() && b.is_closed() && c.is_closed());
}

#[test]
fn test_engine_rejects_invalid_config() {
    assert!(Engine::<u32>::with_config(EngineConfig {
        mailbox_capacity: 0,
        ..EngineConfig::default()
    })
    .is_err());
    assert!(Engine::<u32>::with_config(EngineConfig {
        fanout_chunk: 0,
        ..EngineConfig::default()
    })
    .is_err());
    assert!(Engine::<u32>::with_admission(AdmissionConfig::new(1.0, 0)).is_err());
}

#[tokio::test]
async fn test_publish_to_nonexistent_topic() {
    let engine = Engine::<u32>::new();
    let report = engine.publish("nonexistent_topic", 1).await;

    assert_eq!(report.recipients, 0);
    assert!(!report.rate_limited);
    assert_eq!(engine.topic_count(), 0);
    assert_eq!(engine.stats().published, 1);
}

#[tokio::test]
async fn test_publish_delivers_in_order_to_every_subscriber() {
    let engine = small_engine(16, 64);
    let mut subs: Vec<_> = (0..3).map(|_| engine.subscribe("news")).collect();

    for i in 0..10 {
        let report = engine.publish("news", i).await;
        assert_eq!(report.recipients, 3);
        assert_eq!(report.delivered, 3);
    }

    for sub in subs.iter_mut() {
        assert_eq!(drain(sub), (0..10).collect::<Vec<_>>());
    }
    assert_eq!(engine.stats().delivered, 30);
    assert_eq!(engine.stats().dropped(), 0);
}

#[tokio::test]
async fn test_full_mailbox_drops_newest_for_that_subscriber_only() {
    let engine = small_engine(3, 64);
    let mut slow = engine.subscribe("news");
    let mut fast = engine.subscribe("news");

    let mut fast_seen = Vec::new();
    for i in 0..5 {
        engine.publish("news", i).await;
        fast_seen.extend(drain(&mut fast));
    }

    assert_eq!(fast_seen, vec![0, 1, 2, 3, 4]);
    assert_eq!(drain(&mut slow), vec![0, 1, 2]);

    let stats = engine.stats();
    assert_eq!(stats.dropped_full, 2);
    assert_eq!(stats.delivered, 8);
}

#[tokio::test]
async fn test_gaps_never_reorder() {
    let engine = small_engine(2, 64);
    let mut sub = engine.subscribe("t");

    engine.publish("t", 1).await;
    engine.publish("t", 2).await;
    engine.publish("t", 3).await; // dropped
    assert_eq!(sub.try_recv().unwrap(), 1);
    engine.publish("t", 4).await;

    assert_eq!(drain(&mut sub), vec![2, 4]);
}

#[tokio::test]
async fn test_topic_isolation() {
    let engine = small_engine(8, 64);
    let mut a = engine.subscribe("a");
    let mut b = engine.subscribe("b");

    engine.publish("a", 1).await;

    assert_eq!(drain(&mut a), vec![1]);
    assert_eq!(b.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chunked_fan_out_reaches_everyone() {
    let engine = small_engine(4, 3);
    let mut subs: Vec<_> = (0..10).map(|_| engine.subscribe("wide")).collect();

    let report = engine.publish("wide", 9).await;
    assert_eq!(report.recipients, 10);
    assert_eq!(report.delivered, 10);
    assert_eq!(report.failed, 0);

    for sub in subs.iter_mut() {
        assert_eq!(sub.try_recv().unwrap(), 9);
    }
}

#[tokio::test]
async fn test_unsubscribe_ends_stream_after_drain() {
    let engine = small_engine(8, 64);
    let mut sub = engine.subscribe("news");
    let mut other = engine.subscribe("news");

    engine.publish("news", 1).await;
    assert!(engine.is_subscribed("news", sub.id()));
    engine.unsubscribe("news", sub.id());
    engine.unsubscribe("news", sub.id());
    assert!(!engine.is_subscribed("news", sub.id()));
    assert!(engine.is_subscribed("news", other.id()));
    engine.publish("news", 2).await;

    assert_eq!(sub.recv().await, Some(1));
    assert_eq!(sub.recv().await, None);
    assert_eq!(drain(&mut other), vec![1, 2]);
    assert_eq!(engine.subscriber_count("news"), 1);
    assert_eq!(engine.stats().closed, 1);
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_engine_stays_usable() {
    let engine = small_engine(8, 64);
    let mut a = engine.subscribe("a");
    let mut b = engine.subscribe("b");

    let mut topics = engine.topics();
    topics.sort();
    assert_eq!(topics, vec!["a".to_string(), "b".to_string()]);

    engine.shutdown();
    engine.shutdown();
    assert!(engine.topics().is_empty());
    assert!(!engine.is_subscribed("a", a.id()));
    assert_eq!(engine.stats().closed, 2);

    assert_eq!(a.recv().await, None);
    assert_eq!(b.recv().await, None);

    // operations after shutdown act on an empty registry
    engine.unsubscribe("a", a.id());
    assert_eq!(engine.publish("a", 1).await.recipients, 0);
    let mut fresh = engine.subscribe("a");
    engine.publish("a", 2).await;
    assert_eq!(fresh.try_recv().unwrap(), 2);
}

#[tokio::test]
async fn test_admission_denial_drops_for_all_subscribers() {
    let open = Arc::new(AtomicBool::new(true));
    let gate = {
        let open = open.clone();
        move || open.load(Ordering::SeqCst)
    };
    let engine = Engine::<u32>::with_gate(EngineConfig::default(), gate).unwrap();
    let mut a = engine.subscribe("t");
    let mut b = engine.subscribe("t");

    engine.publish("t", 1).await;
    open.store(false, Ordering::SeqCst);
    let report = engine.publish("t", 2).await;
    assert!(report.rate_limited);
    assert_eq!(report.recipients, 0);
    open.store(true, Ordering::SeqCst);
    engine.publish("t", 3).await;

    assert_eq!(drain(&mut a), vec![1, 3]);
    assert_eq!(drain(&mut b), vec![1, 3]);
    let stats = engine.stats();
    assert_eq!(stats.rate_limited, 1);
    assert_eq!(stats.published, 2);
}

#[tokio::test]
async fn test_admission_consulted_once_per_publish() {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let gate = {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    };
    let engine = Engine::<u32>::with_gate(EngineConfig::default(), gate).unwrap();
    let _subs: Vec<_> = (0..5).map(|_| engine.subscribe("t")).collect();

    engine.publish("t", 1).await;
    engine.publish("nobody", 2).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dropped_consumer_counts_as_closed_drop() {
    let engine = small_engine(8, 64);
    let sub = engine.subscribe("t");
    drop(sub);

    let report = engine.publish("t", 1).await;
    assert_eq!(report.dropped_closed, 1);
    assert_eq!(engine.stats().dropped_closed, 1);
}

#[tokio::test]
async fn test_dropped_mailbox_stays_registered_until_unsubscribe() {
    let engine = small_engine(8, 64);
    let ids: Vec<_> = (0..3).map(|_| engine.subscribe("t").id()).collect();

    assert_eq!(engine.subscriber_count("t"), 3);
    assert_eq!(engine.publish("t", 1).await.dropped_closed, 3);

    for id in &ids {
        assert!(engine.is_subscribed("t", *id));
        engine.unsubscribe("t", *id);
    }
    assert_eq!(engine.topic_count(), 0);
    assert_eq!(engine.publish("t", 2).await.recipients, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_publish_races_unsubscribe_without_fault() {
    let engine = Arc::new(small_engine(4, 2));
    let subs: Vec<_> = (0..8).map(|_| engine.subscribe("race")).collect();
    let ids: Vec<_> = subs.iter().map(|s| s.id()).collect();

    let publisher = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                engine.publish("race", i).await;
            }
        })
    };
    for id in ids {
        engine.unsubscribe("race", id);
        tokio::task::yield_now().await;
    }
    engine.shutdown();

    timeout(Duration::from_secs(5), publisher)
        .await
        .expect("publisher hung")
        .unwrap();
    for mut sub in subs {
        // every stream terminates; at most `capacity` messages were queued
        let remaining = timeout(Duration::from_secs(1), async {
            let mut n = 0;
            while sub.recv().await.is_some() {
                n += 1;
            }
            n
        })
        .await
        .expect("stream did not end");
        assert!(remaining <= 4);
    }
}
