//! Real-time fanout of published events to live subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::types::EventEnvelope;

struct Registry {
  next_id: u64,
  senders: HashMap<u64, mpsc::Sender<EventEnvelope>>,
}

/// Explicit subscription registry: handle -> bounded buffer.
///
/// `publish` never awaits and never blocks on a subscriber; ingestion
/// throughput is independent of subscriber count and speed. A subscriber whose
/// buffer fills up is forcibly disconnected (its channel closes after the
/// buffered events drain), which keeps the loss visible to the client instead
/// of silently gapping the stream. Subscribers see no historical replay: only
/// events published after `subscribe`, in publish order.
#[derive(Clone)]
pub struct Broadcaster {
  registry: Arc<Mutex<Registry>>,
  capacity: usize,
}

impl Broadcaster {
  pub fn new(capacity: usize) -> Self {
    Self {
      registry: Arc::new(Mutex::new(Registry {
        next_id: 0,
        senders: HashMap::new(),
      })),
      capacity: capacity.max(1),
    }
  }

  /// Register a new observer. The handle deregisters itself on drop.
  pub fn subscribe(&self) -> Subscription {
    let (tx, rx) = mpsc::channel(self.capacity);
    let mut registry = self.registry.lock().expect("subscriber registry lock poisoned");
    let id = registry.next_id;
    registry.next_id += 1;
    registry.senders.insert(id, tx);
    Subscription {
      id,
      rx,
      registry: Arc::downgrade(&self.registry),
    }
  }

  /// Deregister a subscriber by id. Idempotent.
  pub fn unsubscribe(&self, id: u64) {
    let mut registry = self.registry.lock().expect("subscriber registry lock poisoned");
    registry.senders.remove(&id);
  }

  /// Deliver one event to every registered subscriber.
  ///
  /// Returns the number of subscribers the event was buffered for. Overflowing
  /// and disconnected subscribers are pruned here; their faults never reach
  /// the publisher or other subscribers.
  pub fn publish(&self, envelope: &EventEnvelope) -> usize {
    let mut registry = self.registry.lock().expect("subscriber registry lock poisoned");
    let mut delivered = 0;
    let mut dead: Vec<u64> = Vec::new();
    for (&id, sender) in registry.senders.iter() {
      match sender.try_send(envelope.clone()) {
        Ok(()) => delivered += 1,
        Err(TrySendError::Full(_)) => {
          eprintln!("broadcast: subscriber {} overflowed its buffer, disconnecting", id);
          dead.push(id);
        }
        Err(TrySendError::Closed(_)) => dead.push(id),
      }
    }
    for id in dead {
      registry.senders.remove(&id);
    }
    delivered
  }

  pub fn subscriber_count(&self) -> usize {
    self.registry.lock().expect("subscriber registry lock poisoned").senders.len()
  }
}

/// Handle owned by one observer.
///
/// `recv` is the only suspending read in the system: it waits until the
/// broadcaster has something to deliver or the subscription is closed.
pub struct Subscription {
  id: u64,
  rx: mpsc::Receiver<EventEnvelope>,
  registry: Weak<Mutex<Registry>>,
}

impl Subscription {
  pub fn id(&self) -> u64 {
    self.id
  }

  /// Next published event, or `None` once the subscription is closed (force
  /// disconnect after overflow, broadcaster dropped, or explicit
  /// unsubscribe) and the remaining buffered events have been drained.
  pub async fn recv(&mut self) -> Option<EventEnvelope> {
    self.rx.recv().await
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    // Release the registry entry promptly so a disconnected client stops
    // consuming buffer space. Publishing also prunes closed channels lazily.
    if let Some(registry) = self.registry.upgrade() {
      if let Ok(mut registry) = registry.lock() {
        registry.senders.remove(&self.id);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{IncidentGroup, Outcome};
  use chrono::{TimeZone, Utc};
  use uuid::Uuid;

  fn envelope(n: u64) -> EventEnvelope {
    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    EventEnvelope {
      outcome: Outcome::New,
      event: IncidentGroup {
        id: Uuid::new_v4(),
        event_type: "fallen_pm".into(),
        source_id: "bus-1".into(),
        first_seen_at: ts,
        last_seen_at: ts,
        lat: 37.5665,
        lon: 126.978,
        confidence: 0.8,
        grid_key: "37.5665:126.9780".into(),
        occurrence_count: n,
        dedup_group_id: "37.5665:126.9780:fallen_pm:0".into(),
      },
    }
  }

  #[tokio::test]
  async fn subscriber_receives_events_in_publish_order() {
    let broadcaster = Broadcaster::new(8);
    let mut sub = broadcaster.subscribe();
    for n in 1..=3 {
      broadcaster.publish(&envelope(n));
    }
    for n in 1..=3 {
      assert_eq!(sub.recv().await.unwrap().event.occurrence_count, n);
    }
  }

  #[tokio::test]
  async fn no_historical_replay_on_subscribe() {
    let broadcaster = Broadcaster::new(8);
    broadcaster.publish(&envelope(1));
    let mut sub = broadcaster.subscribe();
    broadcaster.publish(&envelope(2));
    assert_eq!(sub.recv().await.unwrap().event.occurrence_count, 2);
  }

  #[tokio::test]
  async fn overflowing_subscriber_is_disconnected() {
    let broadcaster = Broadcaster::new(2);
    let mut slow = broadcaster.subscribe();
    let mut fast = broadcaster.subscribe();

    // Fill the slow subscriber's buffer without draining it.
    broadcaster.publish(&envelope(1));
    broadcaster.publish(&envelope(2));
    // Third publish overflows `slow`; `fast` is unaffected because we drain it.
    assert_eq!(fast.recv().await.unwrap().event.occurrence_count, 1);
    assert_eq!(fast.recv().await.unwrap().event.occurrence_count, 2);
    let delivered = broadcaster.publish(&envelope(3));
    assert_eq!(delivered, 1, "only the fast subscriber should receive");
    assert_eq!(broadcaster.subscriber_count(), 1);
    assert_eq!(fast.recv().await.unwrap().event.occurrence_count, 3);

    // The slow subscriber drains its buffer, then sees end-of-stream.
    assert_eq!(slow.recv().await.unwrap().event.occurrence_count, 1);
    assert_eq!(slow.recv().await.unwrap().event.occurrence_count, 2);
    assert!(slow.recv().await.is_none());
  }

  #[tokio::test]
  async fn publisher_never_blocks_on_a_stalled_subscriber() {
    let broadcaster = Broadcaster::new(1);
    let _stalled = broadcaster.subscribe();
    // Publishing more than the buffer holds must return immediately.
    for n in 1..=10 {
      broadcaster.publish(&envelope(n));
    }
    assert_eq!(broadcaster.subscriber_count(), 0);
  }

  #[tokio::test]
  async fn dropping_a_subscription_deregisters_it() {
    let broadcaster = Broadcaster::new(8);
    let sub = broadcaster.subscribe();
    assert_eq!(broadcaster.subscriber_count(), 1);
    drop(sub);
    assert_eq!(broadcaster.subscriber_count(), 0);
    // Other subscribers are unaffected.
    let mut other = broadcaster.subscribe();
    broadcaster.publish(&envelope(1));
    assert!(other.recv().await.is_some());
  }

  #[tokio::test]
  async fn unsubscribe_is_idempotent() {
    let broadcaster = Broadcaster::new(8);
    let sub = broadcaster.subscribe();
    let id = sub.id();
    broadcaster.unsubscribe(id);
    broadcaster.unsubscribe(id);
    assert_eq!(broadcaster.subscriber_count(), 0);
  }

  #[tokio::test]
  async fn recv_suspends_until_publish() {
    let broadcaster = Broadcaster::new(8);
    let mut sub = broadcaster.subscribe();
    let publisher = broadcaster.clone();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(std::time::Duration::from_millis(10)).await;
      publisher.publish(&envelope(7));
    });
    let received = sub.recv().await.unwrap();
    assert_eq!(received.event.occurrence_count, 7);
    handle.await.unwrap();
  }
}
