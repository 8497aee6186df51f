//! Shared application state.

use dedup_engine::IngestPipeline;

use crate::store_pg::PgEventStore;

pub struct AppState {
  pub pipeline: IngestPipeline<PgEventStore>,
}
