use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use matcher::{Criterion, ForwardTarget, ForwardingRule, RoutingRule, RuleCriteria};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Payload for creating or updating a routing rule.
#[derive(Debug, Deserialize)]
pub struct RoutingRulePayload {
    pub name: String,
    pub criteria: RuleCriteria,
    pub priority: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub workspace_id: String,
}

/// Payload for creating or updating a forwarding rule.
#[derive(Debug, Deserialize)]
pub struct ForwardingRulePayload {
    pub name: String,
    pub criteria: RuleCriteria,
    pub priority: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub forward_enabled: bool,
    pub target: ForwardTarget,
}

/// Bulk-create payload: one forwarding rule over a comma-separated zip list
/// (the shape produced by pasting a spreadsheet column into the admin UI).
#[derive(Debug, Deserialize)]
pub struct BulkForwardingPayload {
    pub name: String,
    /// Comma-separated zips, e.g. `"90210, 90211,90212-1234"`.
    pub zip_codes: String,
    #[serde(default = "Criterion::wildcard")]
    pub product_types: Criterion,
    #[serde(default = "Criterion::wildcard")]
    pub states: Criterion,
    pub priority: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub forward_enabled: bool,
    pub target: ForwardTarget,
}

fn default_true() -> bool {
    true
}

// ── Routing rules ───────────────────────────────────────────────────────

pub async fn create_routing_rule(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
    Json(payload): Json<RoutingRulePayload>,
) -> ServerResult<impl IntoResponse> {
    let mut rule = RoutingRule {
        id: 0,
        scope,
        name: payload.name,
        criteria: payload.criteria,
        priority: payload.priority,
        is_active: payload.is_active,
        workspace_id: payload.workspace_id,
        created_at: Utc::now(),
    };
    rule.validate()?;
    let rule = state.store.put_routing_rule(rule)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn list_routing_rules(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let rules = state.store.routing_rules(&scope)?;
    let total = rules.len();
    Ok(Json(json!({ "rules": rules, "total": total })))
}

pub async fn update_routing_rule(
    State(state): State<Arc<ServerState>>,
    Path((scope, id)): Path<(String, u64)>,
    Json(payload): Json<RoutingRulePayload>,
) -> ServerResult<impl IntoResponse> {
    let existing = state
        .store
        .routing_rules(&scope)?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or(ServerError::NotFound)?;

    let mut rule = RoutingRule {
        id,
        scope,
        name: payload.name,
        criteria: payload.criteria,
        priority: payload.priority,
        is_active: payload.is_active,
        workspace_id: payload.workspace_id,
        created_at: existing.created_at,
    };
    rule.validate()?;
    let rule = state.store.put_routing_rule(rule)?;
    Ok(Json(rule))
}

pub async fn delete_routing_rule(
    State(state): State<Arc<ServerState>>,
    Path((scope, id)): Path<(String, u64)>,
) -> ServerResult<impl IntoResponse> {
    if !state.store.delete_routing_rule(&scope, id)? {
        return Err(ServerError::NotFound);
    }
    Ok(Json(json!({ "id": id, "status": "deleted" })))
}

// ── Forwarding rules ────────────────────────────────────────────────────

pub async fn create_forwarding_rule(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
    Json(payload): Json<ForwardingRulePayload>,
) -> ServerResult<impl IntoResponse> {
    let mut rule = ForwardingRule {
        id: 0,
        scope,
        name: payload.name,
        criteria: payload.criteria,
        priority: payload.priority,
        is_active: payload.is_active,
        forward_enabled: payload.forward_enabled,
        target: payload.target,
        created_at: Utc::now(),
    };
    rule.validate()?;
    let rule = state.store.put_forwarding_rule(rule)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Bulk-create: parse the comma-separated zip list into one rule's zip set.
pub async fn create_forwarding_rule_bulk(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
    Json(payload): Json<BulkForwardingPayload>,
) -> ServerResult<impl IntoResponse> {
    let zips: Vec<String> = payload
        .zip_codes
        .split(',')
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .map(String::from)
        .collect();
    if zips.is_empty() {
        return Err(ServerError::BadRequest(
            "zip_codes must contain at least one zip".to_string(),
        ));
    }

    let mut rule = ForwardingRule {
        id: 0,
        scope,
        name: payload.name,
        criteria: RuleCriteria {
            product_types: payload.product_types,
            zip_codes: Criterion::exact(zips),
            states: payload.states,
        },
        priority: payload.priority,
        is_active: payload.is_active,
        forward_enabled: payload.forward_enabled,
        target: payload.target,
        created_at: Utc::now(),
    };
    rule.validate()?;
    let rule = state.store.put_forwarding_rule(rule)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn list_forwarding_rules(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let rules = state.store.forwarding_rules(&scope)?;
    let total = rules.len();
    Ok(Json(json!({ "rules": rules, "total": total })))
}

pub async fn update_forwarding_rule(
    State(state): State<Arc<ServerState>>,
    Path((scope, id)): Path<(String, u64)>,
    Json(payload): Json<ForwardingRulePayload>,
) -> ServerResult<impl IntoResponse> {
    let existing = state
        .store
        .get_forwarding_rule(&scope, id)?
        .ok_or(ServerError::NotFound)?;

    let mut rule = ForwardingRule {
        id,
        scope,
        name: payload.name,
        criteria: payload.criteria,
        priority: payload.priority,
        is_active: payload.is_active,
        forward_enabled: payload.forward_enabled,
        target: payload.target,
        created_at: existing.created_at,
    };
    rule.validate()?;
    let rule = state.store.put_forwarding_rule(rule)?;
    Ok(Json(rule))
}

pub async fn delete_forwarding_rule(
    State(state): State<Arc<ServerState>>,
    Path((scope, id)): Path<(String, u64)>,
) -> ServerResult<impl IntoResponse> {
    if !state.store.delete_forwarding_rule(&scope, id)? {
        return Err(ServerError::NotFound);
    }
    Ok(Json(json!({ "id": id, "status": "deleted" })))
}
