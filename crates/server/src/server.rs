//! Server initialization and routing
//!
//! This module handles the axum server setup including:
//! - Router configuration with all API endpoints
//! - Middleware stack (auth, logging, compression, etc.)
//! - Prometheus recorder installation
//! - Graceful shutdown handling

use crate::config::ServerConfig;
use crate::middleware::{api_key_auth, log_requests, request_id};
use crate::routes::{api_info, not_found};
use crate::routes::{forwarding, health, rules, webhook};
use crate::state::ServerState;
use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the axum router with all routes and middleware.
///
/// Routes are divided into:
/// - Public routes: `/`, `/health`, `/ready`, `/metrics`, and the webhook
///   ingestion endpoint (providers authenticate by knowing the webhook id)
/// - Protected routes: the `/api/v1/*` admin surface (API key required)
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .route("/webhook/{webhook_id}", post(webhook::receive_lead));

    // Protected routes (require API key)
    let protected_routes = Router::new()
        // Routing rules
        .route(
            "/api/v1/scopes/{scope}/routing-rules",
            post(rules::create_routing_rule).get(rules::list_routing_rules),
        )
        .route(
            "/api/v1/scopes/{scope}/routing-rules/{id}",
            put(rules::update_routing_rule),
        )
        .route(
            "/api/v1/scopes/{scope}/routing-rules/{id}",
            delete(rules::delete_routing_rule),
        )
        // Forwarding rules
        .route(
            "/api/v1/scopes/{scope}/forwarding-rules",
            post(rules::create_forwarding_rule).get(rules::list_forwarding_rules),
        )
        .route(
            "/api/v1/scopes/{scope}/forwarding-rules/bulk",
            post(rules::create_forwarding_rule_bulk),
        )
        .route(
            "/api/v1/scopes/{scope}/forwarding-rules/{id}",
            put(rules::update_forwarding_rule),
        )
        .route(
            "/api/v1/scopes/{scope}/forwarding-rules/{id}",
            delete(rules::delete_forwarding_rule),
        )
        // Master toggle
        .route(
            "/api/v1/scopes/{scope}/forwarding-toggle",
            patch(forwarding::set_forwarding_toggle).get(forwarding::get_forwarding_toggle),
        )
        // Audit
        .route(
            "/api/v1/scopes/{scope}/forwarding-log",
            get(forwarding::forwarding_log),
        )
        .route(
            "/api/v1/scopes/{scope}/forwarding-stats",
            get(forwarding::forwarding_stats),
        )
        // Metadata
        .route("/api/v1/metadata", get(health::server_metadata))
        .layer(from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.timeout_secs,
        )))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(request_id))
        .layer(from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the LeadRelay HTTP server.
///
/// Initializes structured logging, installs the Prometheus recorder, creates
/// shared state (store + dispatch worker), and serves until SIGTERM/Ctrl+C.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    let metrics_handle = if config.metrics_enabled {
        Some(PrometheusBuilder::new().install_recorder()?)
    } else {
        None
    };

    let mut state = ServerState::new(config.clone())?;
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }
    let state = Arc::new(state);

    let app = build_router(state);

    let addr: SocketAddr = config.socket_addr()?;

    tracing::info!(
        "Starting leadrelay server on {} with {} API keys",
        addr,
        config.api_keys.len()
    );
    tracing::info!(
        "Timeout: {}s, Max body: {}MB, Rate limit: {} req/min",
        config.timeout_secs,
        config.max_body_size_mb,
        config.rate_limit_per_minute
    );
    tracing::info!(
        "Storage: {}, CORS: {}, Metrics: {}",
        config.db_path.as_deref().unwrap_or("in-memory"),
        config.enable_cors,
        config.metrics_enabled
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
