//! Object-down detection dedup engine.
//!
//! Collapses near-duplicate detection candidates into incident groups keyed by
//! a coarse spatial bucket plus type tag, persists each result through an
//! `EventStore` collaborator, and fans new/updated groups out to live
//! subscribers in real time.
//!
//! Ingestion for distinct keys runs in parallel; candidates for the same key
//! serialize around the read-modify-write of the active group. Publishing
//! never blocks on a slow subscriber.

pub mod broadcast;
pub mod config;
pub mod dedup;
pub mod error;
pub mod grid;
pub mod pipeline;
pub mod store;
pub mod types;

pub use broadcast::{Broadcaster, Subscription};
pub use config::Config;
pub use dedup::DedupEngine;
pub use error::{IngestError, StoreError};
pub use pipeline::IngestPipeline;
pub use store::{EventStore, MemoryStore};
pub use types::{Candidate, EventEnvelope, InboundCandidate, IncidentGroup, Outcome};
