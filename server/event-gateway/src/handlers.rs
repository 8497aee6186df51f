//! HTTP handlers for the event gateway.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream};
use serde::Deserialize;

use dedup_engine::types::{ErrorOutput, Health};
use dedup_engine::{EventEnvelope, InboundCandidate, IncidentGroup, IngestError};

use crate::state::AppState;

type ErrorResponse = (StatusCode, Json<ErrorOutput>);

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
  Json(state.pipeline.health())
}

pub async fn create_event(
  State(state): State<Arc<AppState>>,
  Json(payload): Json<InboundCandidate>,
) -> Result<Json<EventEnvelope>, ErrorResponse> {
  match state.pipeline.ingest(&payload).await {
    Ok(envelope) => Ok(Json(envelope)),
    Err(IngestError::Validation { field, reason }) => Err((
      StatusCode::BAD_REQUEST,
      Json(ErrorOutput::new(reason).with_field(field)),
    )),
    Err(e) => {
      eprintln!("event-gateway: ingest failed: {}", e);
      Err((
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorOutput::new(e.to_string())),
      ))
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default = "default_hours")]
  pub hours: u32,
}

fn default_hours() -> u32 {
  24
}

pub async fn list_events(
  State(state): State<Arc<AppState>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<IncidentGroup>>, ErrorResponse> {
  if !(1..=168).contains(&params.hours) {
    return Err((
      StatusCode::BAD_REQUEST,
      Json(ErrorOutput::new("hours must be within 1..=168").with_field("hours")),
    ));
  }
  match state.pipeline.recent(params.hours).await {
    Ok(events) => Ok(Json(events)),
    Err(e) => {
      eprintln!("event-gateway: query failed: {}", e);
      Err((
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorOutput::new(e.to_string())),
      ))
    }
  }
}

/// Long-lived SSE feed. Each frame's data is one EventEnvelope JSON document.
///
/// The subscription deregisters itself when the client disconnects and the
/// stream is dropped; a subscriber that falls behind is disconnected by the
/// broadcaster and its stream simply ends.
pub async fn stream_events(
  State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
  let subscription = state.pipeline.subscribe();
  let stream = stream::unfold(subscription, |mut subscription| async move {
    let envelope = subscription.recv().await?;
    let event = Event::default().json_data(&envelope).ok()?;
    Some((Ok::<Event, Infallible>(event), subscription))
  });
  Sse::new(stream).keep_alive(KeepAlive::default())
}
