//! LeadRelay Server - HTTP REST API for lead ingestion and forwarding
//! administration.
//!
//! This crate provides the HTTP surface over the lead engine:
//!
//! - **Lead ingestion**: the public webhook endpoint that deduplicates
//!   submissions into contacts and triggers rule evaluation
//! - **Rule administration**: CRUD for routing and forwarding rules,
//!   including a bulk-create variant for comma-separated zip lists
//! - **Master toggle**: the per-scope forwarding kill switch
//! - **Audit**: paginated forwarding log and aggregate delivery stats
//! - **Health & metrics**: liveness/readiness probes and Prometheus metrics
//!
//! # Features
//!
//! - **Authentication**: API key auth with rate limiting on the admin surface
//! - **Middleware**: compression, CORS, request ID tracking, structured logging
//! - **Configuration**: environment variable and file-based configuration
//! - **Graceful shutdown**: SIGTERM/Ctrl+C handling
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! ## Public Endpoints (No Authentication)
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics
//! - `POST /webhook/{webhook_id}` - Lead ingestion
//!
//! ## Protected Endpoints (API Key Required)
//!
//! - `POST|GET /api/v1/scopes/{scope}/routing-rules`
//! - `PUT|DELETE /api/v1/scopes/{scope}/routing-rules/{id}`
//! - `POST|GET /api/v1/scopes/{scope}/forwarding-rules`
//! - `POST /api/v1/scopes/{scope}/forwarding-rules/bulk`
//! - `PUT|DELETE /api/v1/scopes/{scope}/forwarding-rules/{id}`
//! - `PATCH|GET /api/v1/scopes/{scope}/forwarding-toggle`
//! - `GET /api/v1/scopes/{scope}/forwarding-log`
//! - `GET /api/v1/scopes/{scope}/forwarding-stats`
//! - `GET /api/v1/metadata`

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
