pub mod config;
pub mod error;
pub mod events;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod rooms;

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{FromRef, State},
    http::{Method, Uri},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::Config;
pub use error::{Error, Result};
pub use relay::Relay;

use events::RoomSummary;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            relay: Arc::new(Relay::new(&config)),
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/rooms", get(active_rooms))
        .route("/socket", get(rooms::ws::socket))
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[debug_handler(state = AppState)]
async fn health(State(config): State<Arc<Config>>) -> Json<Value> {
    Json(json!({
        "message": "signaling relay is running",
        "status": "ok",
        "port": config.port,
    }))
}

#[debug_handler(state = AppState)]
async fn active_rooms(State(relay): State<Arc<Relay>>) -> Json<Vec<RoomSummary>> {
    Json(relay.active_rooms().await)
}

async fn not_found(method: Method, uri: Uri) -> Error {
    Error::RouteNotFound { method: method.to_string(), path: uri.path().to_owned() }
}
