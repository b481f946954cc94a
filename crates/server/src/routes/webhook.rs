use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use ingest::RawLeadSubmission;
use serde_json::json;
use std::sync::Arc;

/// Receive one inbound lead submission.
///
/// This is the public ingestion surface consumed by external webhook
/// providers. The path segment is the scope: phone-based dedup and rule
/// evaluation are confined to it.
///
/// The response distinguishes whether the submission resolved to a brand-new
/// contact or an existing one; forwarding runs asynchronously afterwards and
/// never affects this response — the only failures a submitter can see are
/// validation errors.
///
/// # Example
/// ```json
/// // Request
/// {
///   "firstName": "Ada",
///   "lastName": "Lovelace",
///   "email": "ada@example.com",
///   "source": "google-ads",
///   "phone": "(555) 123-4567",
///   "productType": "Solar",
///   "zipCode": "90210",
///   "state": "CA"
/// }
///
/// // Response
/// { "status": "success", "contact_id": 1, "lead_id": 4, "contact_status": "new" }
/// ```
pub async fn receive_lead(
    State(state): State<Arc<ServerState>>,
    Path(webhook_id): Path<String>,
    Json(raw): Json<RawLeadSubmission>,
) -> ServerResult<impl IntoResponse> {
    let outcome = leadrelay::process_lead(
        raw,
        &webhook_id,
        &state.pipeline,
        &state.store,
        Some(&state.dispatch),
    )?;

    metrics::counter!(
        "leadrelay_leads_ingested_total",
        "contact_status" => outcome.contact_status.as_str()
    )
    .increment(1);

    Ok(Json(json!({
        "status": "success",
        "contact_id": outcome.contact_id,
        "lead_id": outcome.lead_id,
        "contact_status": outcome.contact_status.as_str(),
    })))
}
