//! Engine configuration with sane defaults.

/// Tunable knobs for deduplication and fanout.
#[derive(Debug, Clone)]
pub struct Config {
  /// Sliding dedup window in seconds. A candidate within this many seconds of
  /// the active group's `last_seen_at` (inclusive) merges into it.
  pub window_secs: i64,
  /// Accepted candidate type tags; anything else is rejected at validation.
  pub known_types: Vec<String>,
  /// Bounded buffer capacity per subscriber. A subscriber whose buffer fills
  /// up is forcibly disconnected rather than slowing the publisher.
  pub subscriber_buffer: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      window_secs: 600,
      known_types: vec!["fallen_pm".to_string()],
      subscriber_buffer: 64,
    }
  }
}
