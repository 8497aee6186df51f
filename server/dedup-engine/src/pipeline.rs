//! Ingest orchestration: validate, dedup, persist, broadcast.

use chrono::{DateTime, Duration, Utc};

use crate::broadcast::{Broadcaster, Subscription};
use crate::config::Config;
use crate::dedup::DedupEngine;
use crate::error::IngestError;
use crate::store::EventStore;
use crate::types::{Candidate, EventEnvelope, Health, InboundCandidate, IncidentGroup};

/// Front door of the core. Owns the engine and broadcaster; the store is the
/// external persistence collaborator.
///
/// Constructed explicitly and passed around (no process-wide singletons), so
/// tests run against isolated instances.
pub struct IngestPipeline<S> {
  engine: DedupEngine,
  broadcaster: Broadcaster,
  store: S,
  config: Config,
}

impl<S: EventStore> IngestPipeline<S> {
  pub fn new(config: Config, store: S) -> Self {
    Self {
      engine: DedupEngine::new(config.clone()),
      broadcaster: Broadcaster::new(config.subscriber_buffer),
      store,
      config,
    }
  }

  /// Process one inbound candidate end to end.
  ///
  /// The staged dedup result is committed only after the durable write
  /// succeeds, so a persistence failure leaves the active-group table exactly
  /// as it was and nothing is published. The per-key lock is held across the
  /// write, making dedup-state-plus-storage a single atomic commit per key.
  pub async fn ingest(&self, raw: &InboundCandidate) -> Result<EventEnvelope, IngestError> {
    let candidate = self.validate(raw)?;
    let staged = self.engine.begin(&candidate).await;
    self
      .store
      .save(staged.group())
      .await
      .map_err(|e| IngestError::Persistence(e.to_string()))?;
    let (outcome, event) = staged.commit();
    let envelope = EventEnvelope { outcome, event };
    self.broadcaster.publish(&envelope);
    Ok(envelope)
  }

  /// Groups seen in the last `hours` hours, newest first.
  pub async fn recent(&self, hours: u32) -> Result<Vec<IncidentGroup>, IngestError> {
    let since = Utc::now() - Duration::hours(i64::from(hours));
    self
      .store
      .query_since(since)
      .await
      .map_err(|e| IngestError::Persistence(e.to_string()))
  }

  /// Register a live observer of every subsequent publish.
  pub fn subscribe(&self) -> Subscription {
    self.broadcaster.subscribe()
  }

  pub fn health(&self) -> Health {
    Health {
      status: "ok",
      tracked_groups: self.engine.tracked_keys(),
      subscribers: self.broadcaster.subscriber_count(),
    }
  }

  fn validate(&self, raw: &InboundCandidate) -> Result<Candidate, IngestError> {
    if !self.config.known_types.iter().any(|t| t == &raw.event_type) {
      return Err(IngestError::validation("type", "unknown event type"));
    }
    if !raw.lat.is_finite() || !(-90.0..=90.0).contains(&raw.lat) {
      return Err(IngestError::validation("lat", "latitude outside [-90, 90]"));
    }
    if !raw.lon.is_finite() || !(-180.0..=180.0).contains(&raw.lon) {
      return Err(IngestError::validation("lon", "longitude outside [-180, 180]"));
    }
    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
      return Err(IngestError::validation("confidence", "confidence outside [0, 1]"));
    }
    let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
      .map_err(|e| IngestError::Validation {
        field: "timestamp".to_string(),
        reason: format!("not ISO-8601: {}", e),
      })?
      .with_timezone(&Utc);
    Ok(Candidate {
      event_type: raw.event_type.clone(),
      source_id: raw.source_id.clone(),
      lat: raw.lat,
      lon: raw.lon,
      confidence: raw.confidence,
      timestamp,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use crate::types::Outcome;

  fn inbound(confidence: f64, timestamp: &str) -> InboundCandidate {
    InboundCandidate {
      event_type: "fallen_pm".into(),
      source_id: "bus-1".into(),
      lat: 37.5665,
      lon: 126.978,
      confidence,
      timestamp: timestamp.into(),
    }
  }

  fn pipeline() -> IngestPipeline<MemoryStore> {
    IngestPipeline::new(Config::default(), MemoryStore::new())
  }

  #[tokio::test]
  async fn valid_candidate_is_ingested_and_persisted() {
    let store = std::sync::Arc::new(MemoryStore::new());
    let pipeline = IngestPipeline::new(Config::default(), store.clone());
    let envelope = pipeline
      .ingest(&inbound(0.8, "2025-03-01T12:00:00Z"))
      .await
      .unwrap();
    assert_eq!(envelope.outcome, Outcome::New);
    assert_eq!(store.len(), 1);
    // A merge upserts the same row rather than writing a second one.
    pipeline
      .ingest(&inbound(0.9, "2025-03-01T12:02:00Z"))
      .await
      .unwrap();
    assert_eq!(store.len(), 1);
  }

  #[tokio::test]
  async fn unknown_type_is_rejected() {
    let pipeline = pipeline();
    let mut raw = inbound(0.8, "2025-03-01T12:00:00Z");
    raw.event_type = "meteor".into();
    let err = pipeline.ingest(&raw).await.unwrap_err();
    assert!(err.to_string().contains("type"));
    assert_eq!(pipeline.health().tracked_groups, 0);
  }

  #[tokio::test]
  async fn out_of_range_latitude_is_rejected() {
    let pipeline = pipeline();
    let mut raw = inbound(0.8, "2025-03-01T12:00:00Z");
    raw.lat = 91.0;
    let err = pipeline.ingest(&raw).await.unwrap_err();
    assert!(err.to_string().contains("lat"));
  }

  #[tokio::test]
  async fn out_of_range_confidence_is_rejected() {
    let pipeline = pipeline();
    let err = pipeline
      .ingest(&inbound(1.2, "2025-03-01T12:00:00Z"))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("confidence"));
  }

  #[tokio::test]
  async fn nan_confidence_is_rejected() {
    let pipeline = pipeline();
    let err = pipeline
      .ingest(&inbound(f64::NAN, "2025-03-01T12:00:00Z"))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("confidence"));
  }

  #[tokio::test]
  async fn bad_timestamp_is_rejected() {
    let pipeline = pipeline();
    let err = pipeline.ingest(&inbound(0.8, "not-a-date")).await.unwrap_err();
    assert!(err.to_string().contains("timestamp"));
  }

  #[tokio::test]
  async fn offset_timestamps_are_normalized_to_utc() {
    let pipeline = pipeline();
    let first = pipeline
      .ingest(&inbound(0.8, "2025-03-01T21:00:00+09:00"))
      .await
      .unwrap();
    // Same instant expressed in UTC merges.
    let second = pipeline
      .ingest(&inbound(0.8, "2025-03-01T12:00:00Z"))
      .await
      .unwrap();
    assert_eq!(second.outcome, Outcome::Update);
    assert_eq!(second.event.id, first.event.id);
  }

  #[tokio::test]
  async fn rejected_candidate_has_no_effects() {
    let pipeline = pipeline();
    let mut sub = pipeline.subscribe();
    let _ = pipeline.ingest(&inbound(2.0, "2025-03-01T12:00:00Z")).await;
    assert_eq!(pipeline.health().tracked_groups, 0);
    // Nothing published: a subsequent valid ingest is the first frame seen.
    pipeline
      .ingest(&inbound(0.8, "2025-03-01T12:00:00Z"))
      .await
      .unwrap();
    let frame = sub.recv().await.unwrap();
    assert_eq!(frame.outcome, Outcome::New);
  }

  #[tokio::test]
  async fn ingest_publishes_to_subscribers() {
    let pipeline = pipeline();
    let mut sub = pipeline.subscribe();
    let envelope = pipeline
      .ingest(&inbound(0.8, "2025-03-01T12:00:00Z"))
      .await
      .unwrap();
    let frame = sub.recv().await.unwrap();
    assert_eq!(frame.event.id, envelope.event.id);
    assert_eq!(frame.outcome, Outcome::New);
  }
}
