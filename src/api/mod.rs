//! HTTP API for stream key issuance
//!
//! - `POST /api/stream-keys` - Issue a key pair, or return the live one
//! - `GET /api/stream-keys` - List every stored pair
//! - `DELETE /api/stream-keys/:cpk` - Delete a pair
//! - `GET /api/stats` - Connection counters and key count
//! - `GET /health` - Liveness

pub mod error;
pub mod stream_keys;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::keystore::{KeyStore, KeyStoreConfig};
use crate::stats::{ConnectionCounters, ServerStats};

pub use error::ErrorResponse;

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub keystore: Arc<KeyStore>,
    pub counters: Arc<ConnectionCounters>,
    pub keystore_config: Arc<KeyStoreConfig>,
}

impl AppState {
    pub fn new(
        keystore: Arc<KeyStore>,
        counters: Arc<ConnectionCounters>,
        keystore_config: Arc<KeyStoreConfig>,
    ) -> Self {
        Self {
            keystore,
            counters,
            keystore_config,
        }
    }
}

/// Build the HTTP API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/stream-keys",
            post(stream_keys::issue_stream_key).get(stream_keys::list_stream_keys),
        )
        .route("/api/stream-keys/:cpk", delete(stream_keys::delete_stream_key))
        .route("/api/stats", get(stats_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub connections: ServerStats,
    pub stream_keys: usize,
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        time: Utc::now(),
    })
}

/// Connection counters and number of stored key pairs
async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.counters.snapshot(),
        stream_keys: state.keystore.len().await,
    })
}
