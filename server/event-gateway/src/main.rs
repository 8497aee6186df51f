//! Binary entrypoint for the event gateway.

use axum::{routing::get, routing::post, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use dedup_engine::{Config, IngestPipeline};
use event_gateway::{handlers, AppState, PgEventStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
  let port: u16 = std::env::var("PORT")
    .unwrap_or_else(|_| "5006".into())
    .parse()
    .expect("PORT must be a valid u16");

  let pool = sqlx::PgPool::connect(&database_url).await?;
  let store = PgEventStore::new(pool);
  store.ensure_schema().await?;

  let state = Arc::new(AppState {
    pipeline: IngestPipeline::new(Config::default(), store),
  });

  let app = Router::new()
    .route("/health", get(handlers::health))
    .route("/events", post(handlers::create_event).get(handlers::list_events))
    .route("/stream", get(handlers::stream_events))
    .layer(CorsLayer::permissive())
    .with_state(state);

  let addr = SocketAddr::from(([127, 0, 0, 1], port));
  println!("event-gateway listening on http://{}", addr);

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app).await?;

  Ok(())
}
