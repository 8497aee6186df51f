//! Spatial bucketing and dedup lineage keys.

use chrono::{DateTime, Utc};

/// Coordinates are bucketed at 4 decimal places (~11 m at mid latitudes).
const GRID_SCALE: f64 = 1e4;

/// Reference epoch for time buckets: 2020-01-01T00:00:00Z.
const BUCKET_EPOCH_UNIX: i64 = 1_577_836_800;

/// Coarse spatial bucket for a coordinate pair.
///
/// Pure and total; equal inputs (post-rounding) always yield identical keys,
/// which is the only property downstream grouping relies on.
pub fn grid_key(lat: f64, lon: f64) -> String {
  format!("{:.4}:{:.4}", round4(lat), round4(lon))
}

/// Index of the whole dedup window containing `ts`, counted from the bucket
/// epoch. Floor division, so pre-epoch timestamps land in negative buckets.
pub fn time_bucket(ts: DateTime<Utc>, window_secs: i64) -> i64 {
  (ts.timestamp() - BUCKET_EPOCH_UNIX).div_euclid(window_secs)
}

/// Lineage id for a group: "{grid_key}:{type}:{bucket}".
pub fn dedup_group_id(grid_key: &str, event_type: &str, bucket: i64) -> String {
  format!("{}:{}:{}", grid_key, event_type, bucket)
}

fn round4(v: f64) -> f64 {
  let r = (v * GRID_SCALE).round() / GRID_SCALE;
  // Collapse -0.0 so "just below zero" and "just above zero" share a bucket.
  if r == 0.0 {
    0.0
  } else {
    r
  }
}
