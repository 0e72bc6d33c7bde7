//! REST API and live event stream for the monitoring hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared services** (store, dashboard, ingestion, live bus) in [`ApiState`]
//! - **Server-Sent Events** for run completions
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/sites` - List sites with their latest run
//! - `GET /api/v1/sites/:id/config` - Check configuration (enabled pages)
//! - `POST /api/v1/sites/:id/trigger` - Queue a manual run
//! - `GET /api/v1/sites/:id/overview` - Status, uptime, issues, percentiles
//! - `GET /api/v1/sites/:id/timeseries/errors` - Error series
//! - `GET /api/v1/sites/:id/timeseries/performance` - Load time series
//! - `GET /api/v1/sites/:id/runs` - Runs with failures
//! - `GET /api/v1/sites/:id/report` - Weekly report data
//! - `GET /api/v1/runs/:id` - Run details
//! - `POST /api/v1/ingest/runs` - Submit a completed run
//! - `GET /api/v1/events?siteId=` - Live event stream (SSE)

pub mod error;
pub mod events;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::{Ipv4Addr, SocketAddr};

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Build the router with all routes and layers
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/sites", get(routes::sites::list_sites))
        .route(
            "/api/v1/sites/:id/config",
            get(routes::sites::get_site_config),
        )
        .route(
            "/api/v1/sites/:id/trigger",
            post(routes::sites::trigger_site),
        )
        .route(
            "/api/v1/sites/:id/overview",
            get(routes::dashboard::get_overview),
        )
        .route(
            "/api/v1/sites/:id/timeseries/errors",
            get(routes::dashboard::get_error_series),
        )
        .route(
            "/api/v1/sites/:id/timeseries/performance",
            get(routes::dashboard::get_performance_series),
        )
        .route("/api/v1/sites/:id/runs", get(routes::dashboard::list_runs))
        .route(
            "/api/v1/sites/:id/report",
            get(routes::dashboard::get_weekly_report),
        )
        .route("/api/v1/runs/:id", get(routes::dashboard::get_run))
        .route("/api/v1/ingest/runs", post(routes::ingest::ingest_run))
        .route("/api/v1/events", get(events::events_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Add CORS if enabled
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    // Add auth middleware if token provided
    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    // Spawn server in background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
