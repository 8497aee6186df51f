//! Postgres-backed event store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use dedup_engine::{EventStore, IncidentGroup, StoreError};

pub struct PgEventStore {
  pool: sqlx::PgPool,
}

impl PgEventStore {
  pub fn new(pool: sqlx::PgPool) -> Self {
    Self { pool }
  }

  /// Create the events table and its lookup indexes if absent.
  pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
    sqlx::query(
      r#"
      CREATE TABLE IF NOT EXISTS events (
        id UUID PRIMARY KEY,
        type TEXT NOT NULL,
        source_id TEXT NOT NULL,
        first_seen_at TIMESTAMPTZ NOT NULL,
        last_seen_at TIMESTAMPTZ NOT NULL,
        lat DOUBLE PRECISION NOT NULL,
        lon DOUBLE PRECISION NOT NULL,
        confidence DOUBLE PRECISION NOT NULL,
        grid_key TEXT NOT NULL,
        occurrence_count BIGINT NOT NULL DEFAULT 1,
        dedup_group_id TEXT NOT NULL
      )
      "#,
    )
    .execute(&self.pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS ix_events_grid_key_type ON events (grid_key, type)")
      .execute(&self.pool)
      .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS ix_events_last_seen_at ON events (last_seen_at)")
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}

fn store_err(e: sqlx::Error) -> StoreError {
  StoreError(e.to_string())
}

fn group_from_row(row: &PgRow) -> Result<IncidentGroup, StoreError> {
  let occurrence_count: i64 = row.try_get("occurrence_count").map_err(store_err)?;
  Ok(IncidentGroup {
    id: row.try_get("id").map_err(store_err)?,
    event_type: row.try_get("type").map_err(store_err)?,
    source_id: row.try_get("source_id").map_err(store_err)?,
    first_seen_at: row.try_get("first_seen_at").map_err(store_err)?,
    last_seen_at: row.try_get("last_seen_at").map_err(store_err)?,
    lat: row.try_get("lat").map_err(store_err)?,
    lon: row.try_get("lon").map_err(store_err)?,
    confidence: row.try_get("confidence").map_err(store_err)?,
    grid_key: row.try_get("grid_key").map_err(store_err)?,
    occurrence_count: occurrence_count.max(0) as u64,
    dedup_group_id: row.try_get("dedup_group_id").map_err(store_err)?,
  })
}

#[async_trait]
impl EventStore for PgEventStore {
  async fn save(&self, group: &IncidentGroup) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO events (id, type, source_id, first_seen_at, last_seen_at, lat, lon,
                          confidence, grid_key, occurrence_count, dedup_group_id)
      VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
      ON CONFLICT (id) DO UPDATE SET
        last_seen_at = EXCLUDED.last_seen_at,
        confidence = EXCLUDED.confidence,
        occurrence_count = EXCLUDED.occurrence_count
      "#,
    )
    .bind(group.id)
    .bind(&group.event_type)
    .bind(&group.source_id)
    .bind(group.first_seen_at)
    .bind(group.last_seen_at)
    .bind(group.lat)
    .bind(group.lon)
    .bind(group.confidence)
    .bind(&group.grid_key)
    .bind(group.occurrence_count as i64)
    .bind(&group.dedup_group_id)
    .execute(&self.pool)
    .await
    .map_err(store_err)?;
    Ok(())
  }

  async fn query_since(&self, since: DateTime<Utc>) -> Result<Vec<IncidentGroup>, StoreError> {
    let rows = sqlx::query(
      r#"
      SELECT id, type, source_id, first_seen_at, last_seen_at, lat, lon,
             confidence, grid_key, occurrence_count, dedup_group_id
      FROM events
      WHERE last_seen_at >= $1
      ORDER BY last_seen_at DESC
      "#,
    )
    .bind(since)
    .fetch_all(&self.pool)
    .await
    .map_err(store_err)?;

    rows.iter().map(group_from_row).collect()
  }
}
