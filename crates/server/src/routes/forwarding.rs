use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use store::ForwardOutcome;

/// Payload for the master-toggle flip.
#[derive(Debug, Deserialize)]
pub struct TogglePayload {
    pub enabled: bool,
}

/// Query parameters for the forwarding log.
#[derive(Debug, Deserialize)]
pub struct LogQuery {
    /// Filter by outcome (`success`, `failed`, `retry`, `skipped`).
    #[serde(default)]
    pub status: Option<ForwardOutcome>,

    #[serde(default)]
    pub offset: usize,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

const MAX_LOG_PAGE: usize = 500;

/// Flip the per-scope master toggle.
///
/// Last-writer-wins; the dispatcher reads the toggle fresh on every attempt,
/// so disabling takes effect immediately for queued and retrying deliveries.
pub async fn set_forwarding_toggle(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
    Json(payload): Json<TogglePayload>,
) -> ServerResult<impl IntoResponse> {
    state.store.set_forwarding_enabled(&scope, payload.enabled)?;
    tracing::info!(scope = %scope, enabled = payload.enabled, "forwarding toggle updated");
    Ok(Json(json!({ "scope": scope, "forwarding_enabled": payload.enabled })))
}

/// Current toggle state.
pub async fn get_forwarding_toggle(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let enabled = state.store.forwarding_enabled(&scope)?;
    Ok(Json(json!({ "scope": scope, "forwarding_enabled": enabled })))
}

/// Paginated forwarding log, newest first, optionally filtered by outcome.
pub async fn forwarding_log(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
    Query(query): Query<LogQuery>,
) -> ServerResult<impl IntoResponse> {
    let limit = query.limit.min(MAX_LOG_PAGE);
    let entries = state
        .store
        .forward_logs(&scope, query.status, query.offset, limit)?;
    let count = entries.len();
    Ok(Json(json!({
        "entries": entries,
        "count": count,
        "offset": query.offset,
        "limit": limit,
    })))
}

/// Aggregate delivery counts for a scope, plus per-rule cumulative success
/// counters.
pub async fn forwarding_stats(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let stats = state.store.forward_stats(&scope)?;

    let mut per_rule = Vec::new();
    for rule in state.store.forwarding_rules(&scope)? {
        let delivered = state.store.rule_forward_count(&scope, rule.id)?;
        per_rule.push(json!({
            "rule_id": rule.id,
            "name": rule.name,
            "target_id": rule.target.id,
            "delivered": delivered,
        }));
    }

    Ok(Json(json!({
        "scope": scope,
        "totals": stats,
        "rules": per_rule,
    })))
}
