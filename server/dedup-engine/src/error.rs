//! Structured error types for the dedup engine.

use thiserror::Error;

/// Failure of a single `ingest` call.
///
/// Subscriber faults are deliberately absent: a slow or broken subscriber is
/// isolated inside the Broadcaster and never surfaces here.
#[derive(Debug, Error)]
pub enum IngestError {
  /// Malformed or out-of-range candidate; rejected before touching any state.
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  /// Durable write failed; the in-memory dedup state was not applied.
  #[error("persistence: {0}")]
  Persistence(String),
}

impl IngestError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}

/// Opaque failure from an `EventStore` implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);
