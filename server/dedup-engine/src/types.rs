//! Core types for the dedup engine (JSON contracts + internal models).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Inbound types (JSON contract — what the caller sends)
// ---------------------------------------------------------------------------

/// One inbound detection candidate. Unknown fields are silently ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundCandidate {
  #[serde(rename = "type")]
  pub event_type: String,
  pub source_id: String,
  pub lat: f64,
  pub lon: f64,
  pub confidence: f64,
  /// ISO-8601 timestamp, e.g. "2025-03-01T12:00:00Z".
  pub timestamp: String,
}

/// Validated internal candidate. No persistent identity of its own.
#[derive(Debug, Clone)]
pub struct Candidate {
  pub event_type: String,
  pub source_id: String,
  pub lat: f64,
  pub lon: f64,
  pub confidence: f64,
  pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Resolve outcome
// ---------------------------------------------------------------------------

/// Whether a candidate opened a new incident group or merged into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  New,
  Update,
}

// ---------------------------------------------------------------------------
// Incident group (the canonical deduplicated record)
// ---------------------------------------------------------------------------

/// One physical incident, possibly backed by many merged candidates.
///
/// `grid_key`, `dedup_group_id`, the representative coordinates and
/// `source_id` all come from the first candidate and never change; merges only
/// touch `last_seen_at`, `confidence` and `occurrence_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentGroup {
  pub id: Uuid,
  #[serde(rename = "type")]
  pub event_type: String,
  pub source_id: String,
  pub first_seen_at: DateTime<Utc>,
  pub last_seen_at: DateTime<Utc>,
  pub lat: f64,
  pub lon: f64,
  /// Running maximum across all merged candidates.
  pub confidence: f64,
  pub grid_key: String,
  pub occurrence_count: u64,
  /// Group lineage id: "{grid_key}:{type}:{time_bucket}".
  pub dedup_group_id: String,
}

// ---------------------------------------------------------------------------
// Output types (JSON contract — what we emit)
// ---------------------------------------------------------------------------

/// Shared shape of the ingest response and every stream frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
  pub outcome: Outcome,
  pub event: IncidentGroup,
}

/// Liveness snapshot; no persisted state involved.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
  pub status: &'static str,
  /// Number of (grid_key, type) keys the active-group table has seen.
  pub tracked_groups: usize,
  pub subscribers: usize,
}

/// Structured error body for rejected candidates.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}
