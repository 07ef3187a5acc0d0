//! HTTP server exposing the aggregate queries as JSON.
//!
//! This module provides a read-only HTTP API for dashboard front ends:
//! - `GET /health`
//! - `GET /aggregates` - all four views in one document
//! - `GET /aggregates/live`, `/aggregates/window`, `/aggregates/trend`, `/aggregates/day`
//!
//! # Architecture
//!
//! ```text
//! recorder ──→ event store ←── aggregation engine ←── GET /aggregates ←── chart UI
//! ```

use crate::core::aggregation::{
    AggregationConfig, AggregationEngine, DashboardSnapshot, DayDistribution, DominantTrend,
    LiveSnapshot, WindowDistribution,
};
use crate::store::{EventStore, StoreError};
use axum::{extract::State, http::Method, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Store handle shared between the server and other components.
pub type SharedStore = Arc<dyn EventStore>;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Window and business-hours settings for the queries
    pub aggregation: AggregationConfig,
}

impl ServerConfig {
    pub fn new(port: u16, aggregation: AggregationConfig) -> Self {
        Self { port, aggregation }
    }
}

/// Shared server state
pub struct ServerState {
    engine: AggregationEngine<SharedStore>,
}

impl ServerState {
    pub fn new(store: SharedStore, config: &ServerConfig) -> Self {
        Self {
            engine: AggregationEngine::new(store, config.aggregation),
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Run a query on the blocking pool; store access is synchronous.
async fn query<T, F>(state: Arc<ServerState>, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AggregationEngine<SharedStore>) -> Result<T, StoreError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || f(&state.engine))
        .await
        .map_err(|e| {
            tracing::error!("Query task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Query task failed: {}", e),
                    code: "TASK_ERROR".to_string(),
                }),
            )
        })?;

    result.map(Json).map_err(|e| {
        tracing::error!("Aggregate query failed: {}", e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: format!("Event store unavailable: {}", e),
                code: "STORE_UNAVAILABLE".to_string(),
            }),
        )
    })
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /aggregates
async fn aggregates(State(state): State<Arc<ServerState>>) -> ApiResult<DashboardSnapshot> {
    query(state, |engine| engine.snapshot()).await
}

/// GET /aggregates/live
async fn live(State(state): State<Arc<ServerState>>) -> ApiResult<LiveSnapshot> {
    query(state, |engine| engine.live_snapshot()).await
}

/// GET /aggregates/window
async fn window(State(state): State<Arc<ServerState>>) -> ApiResult<WindowDistribution> {
    query(state, |engine| engine.rolling_distribution()).await
}

/// GET /aggregates/trend
async fn trend(State(state): State<Arc<ServerState>>) -> ApiResult<DominantTrend> {
    query(state, |engine| engine.dominant_trend()).await
}

/// GET /aggregates/day
async fn day(State(state): State<Arc<ServerState>>) -> ApiResult<DayDistribution> {
    query(state, |engine| engine.business_hours_distribution()).await
}

/// Build the router without binding a socket.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/aggregates", get(aggregates))
        .route("/aggregates/live", get(live))
        .route("/aggregates/window", get(window))
        .route("/aggregates/trend", get(trend))
        .route("/aggregates/day", get(day))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    store: SharedStore,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(store, &config));
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Aggregate server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
