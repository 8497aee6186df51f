//! Deduplication engine: collapses near-duplicate detections into incident groups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::Config;
use crate::grid;
use crate::types::{Candidate, IncidentGroup, Outcome};

/// Active-group slot for one (grid_key, type) key.
///
/// Holds the most recent group for the key; once that group falls outside the
/// dedup window it stays here until a later candidate supersedes it, but it is
/// never matched again (groups are not resurrected).
#[derive(Debug, Default)]
struct Slot {
  active: Option<IncidentGroup>,
}

type SlotMap = HashMap<(String, String), Arc<AsyncMutex<Slot>>>;

/// Decides, for each incoming candidate, whether it merges into an existing
/// incident group or starts a new one. Owns the active-group table.
///
/// The outer lock is only held to find or allocate a per-key slot and is never
/// held across an await; the per-key async mutex serializes the
/// read-modify-write for that key. Candidates for distinct keys proceed in
/// parallel, and two concurrent candidates for one key can never both observe
/// "no active group".
pub struct DedupEngine {
  config: Config,
  slots: Mutex<SlotMap>,
}

impl DedupEngine {
  pub fn new(config: Config) -> Self {
    Self {
      config,
      slots: Mutex::new(HashMap::new()),
    }
  }

  pub fn with_defaults() -> Self {
    Self::new(Config::default())
  }

  /// Resolve a candidate against the active-group table and commit the result.
  pub async fn resolve(&self, candidate: &Candidate) -> (Outcome, IncidentGroup) {
    self.begin(candidate).await.commit()
  }

  /// Stage a resolve without mutating the table.
  ///
  /// The returned value holds the per-key lock. `commit` applies the staged
  /// group as the key's active group; dropping without committing leaves the
  /// table untouched, so a durable write that fails between `begin` and
  /// `commit` rolls back cleanly and a retried candidate re-resolves from the
  /// unchanged table.
  pub async fn begin(&self, candidate: &Candidate) -> StagedResolve {
    let grid_key = grid::grid_key(candidate.lat, candidate.lon);
    let slot = self.slot_for(grid_key.clone(), candidate.event_type.clone());
    let guard = slot.lock_owned().await;

    let window = Duration::seconds(self.config.window_secs);
    let (outcome, group) = match guard.active.as_ref() {
      // Sliding check against last_seen_at, inclusive at exactly the window.
      // A late out-of-order candidate has a negative delta and also matches.
      Some(active) if candidate.timestamp - active.last_seen_at <= window => {
        let mut updated = active.clone();
        // Lateness never rewinds the window.
        updated.last_seen_at = updated.last_seen_at.max(candidate.timestamp);
        updated.occurrence_count += 1;
        if candidate.confidence > updated.confidence {
          updated.confidence = candidate.confidence;
        }
        (Outcome::Update, updated)
      }
      // No group yet, or the occupant expired: start a fresh lineage.
      _ => {
        let bucket = grid::time_bucket(candidate.timestamp, self.config.window_secs);
        let group = IncidentGroup {
          id: Uuid::new_v4(),
          event_type: candidate.event_type.clone(),
          source_id: candidate.source_id.clone(),
          first_seen_at: candidate.timestamp,
          last_seen_at: candidate.timestamp,
          lat: candidate.lat,
          lon: candidate.lon,
          confidence: candidate.confidence,
          dedup_group_id: grid::dedup_group_id(&grid_key, &candidate.event_type, bucket),
          grid_key,
          occurrence_count: 1,
        };
        (Outcome::New, group)
      }
    };

    StagedResolve {
      guard,
      outcome,
      group,
    }
  }

  /// Number of (grid_key, type) keys the table has seen. Liveness signal only.
  pub fn tracked_keys(&self) -> usize {
    self.slots.lock().expect("active-group table lock poisoned").len()
  }

  fn slot_for(&self, grid_key: String, event_type: String) -> Arc<AsyncMutex<Slot>> {
    let mut slots = self.slots.lock().expect("active-group table lock poisoned");
    slots.entry((grid_key, event_type)).or_default().clone()
  }
}

/// A resolve that has been computed but not yet applied to the table.
pub struct StagedResolve {
  guard: OwnedMutexGuard<Slot>,
  outcome: Outcome,
  group: IncidentGroup,
}

impl StagedResolve {
  pub fn outcome(&self) -> Outcome {
    self.outcome
  }

  pub fn group(&self) -> &IncidentGroup {
    &self.group
  }

  /// Apply the staged group as the active group for its key.
  pub fn commit(mut self) -> (Outcome, IncidentGroup) {
    self.guard.active = Some(self.group.clone());
    (self.outcome, self.group)
  }
}
