//! Persistence collaborator contract and the in-memory store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::IncidentGroup;

/// Durable storage for incident groups.
///
/// The core treats the store as synchronous-from-the-caller's-perspective and
/// durable: `save` must have committed before it returns Ok. `save` is an
/// upsert by id.
#[async_trait]
pub trait EventStore: Send + Sync {
  async fn save(&self, group: &IncidentGroup) -> Result<(), StoreError>;

  /// Groups with `last_seen_at >= since`, newest first.
  async fn query_since(&self, since: DateTime<Utc>) -> Result<Vec<IncidentGroup>, StoreError>;
}

#[async_trait]
impl<S: EventStore> EventStore for std::sync::Arc<S> {
  async fn save(&self, group: &IncidentGroup) -> Result<(), StoreError> {
    (**self).save(group).await
  }

  async fn query_since(&self, since: DateTime<Utc>) -> Result<Vec<IncidentGroup>, StoreError> {
    (**self).query_since(since).await
  }
}

/// In-memory store for tests and database-free runs.
#[derive(Default)]
pub struct MemoryStore {
  groups: Mutex<HashMap<Uuid, IncidentGroup>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.groups.lock().expect("memory store lock poisoned").len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl EventStore for MemoryStore {
  async fn save(&self, group: &IncidentGroup) -> Result<(), StoreError> {
    let mut groups = self.groups.lock().expect("memory store lock poisoned");
    groups.insert(group.id, group.clone());
    Ok(())
  }

  async fn query_since(&self, since: DateTime<Utc>) -> Result<Vec<IncidentGroup>, StoreError> {
    let groups = self.groups.lock().expect("memory store lock poisoned");
    let mut out: Vec<IncidentGroup> = groups
      .values()
      .filter(|g| g.last_seen_at >= since)
      .cloned()
      .collect();
    out.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
    Ok(out)
  }
}
