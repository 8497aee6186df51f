//! Object-Down Detection Event Gateway
//!
//! HTTP service in front of the dedup engine: ingests detection candidates,
//! serves recent incident groups, and streams new/updated groups over SSE.
//! Bind to 127.0.0.1 by default (internal only).

pub mod handlers;
pub mod state;
pub mod store_pg;

pub use state::AppState;
pub use store_pg::PgEventStore;
