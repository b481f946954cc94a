//! Lead ingest layer.
//!
//! This is where submissions enter the pipeline. We take the raw webhook
//! body, run it through validation and normalization, and emit a canonical
//! lead that downstream stages (contact resolution, rule matching,
//! forwarding) can rely on.
//!
//! ## What we do here
//!
//! - **Validate required fields** — first/last name, email, and source must
//!   be present and non-empty after sanitization.
//! - **Normalize identity attributes** — phone to `+1XXXXXXXXXX`, zip to its
//!   5-digit comparison form, state to uppercase 2-letter.
//! - **Derive the dedup key** — phone when present, email fallback or no
//!   dedup per [`IngestConfig`] policy. Downstream never re-derives identity.
//! - **Snapshot the payload** — the original submission is preserved verbatim
//!   for the audit log and outbound forwarding.
//! - **Log everything** — structured events via tracing.
//!
//! Validation errors are rejected here and never reach the resolver or
//! matcher.
//!
//! ## Example
//!
//! ```
//! use ingest::{ingest, IngestConfig, RawLeadSubmission, DedupKey};
//!
//! let raw: RawLeadSubmission = serde_json::from_value(serde_json::json!({
//!     "firstName": "Ada",
//!     "lastName": "Lovelace",
//!     "email": "Ada@Example.com",
//!     "source": "google-ads",
//!     "phone": "(555) 123-4567",
//!     "zipCode": "90210-1234",
//!     "state": "ca"
//! })).unwrap();
//!
//! let lead = ingest(raw, "wh-1", &IngestConfig::default()).unwrap();
//! assert_eq!(lead.phone.as_deref(), Some("+15551234567"));
//! assert_eq!(lead.dedup_key, DedupKey::Phone("+15551234567".into()));
//! assert_eq!(lead.zip.as_deref(), Some("90210"));
//! assert_eq!(lead.state.as_deref(), Some("CA"));
//! ```

use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn, Level};

mod config;
mod error;
mod types;

pub use crate::config::{ConfigError, IngestConfig, InvalidPhonePolicy, PhonelessDedup};
pub use crate::error::IngestError;
pub use crate::types::{CanonicalLead, DedupKey, LeadKind, RawLeadSubmission};

/// Ingest a raw submission: validates fields, normalizes identity attributes,
/// derives the dedup key, and returns a canonical lead.
pub fn ingest(
    raw: RawLeadSubmission,
    scope: &str,
    cfg: &IngestConfig,
) -> Result<CanonicalLead, IngestError> {
    let start = Instant::now();

    let scope = sanitize(scope, cfg.strip_control_chars);
    if scope.is_empty() {
        warn!("ingest_failure: empty scope");
        return Err(IngestError::InvalidScope);
    }

    let span = tracing::span!(Level::INFO, "ingest.lead", scope = %scope, source = %raw.source);
    let _guard = span.enter();

    match ingest_inner(raw, &scope, cfg) {
        Ok(lead) => {
            info!(
                scope = %lead.scope,
                kind = ?lead.kind,
                has_phone = lead.phone.is_some(),
                dedup = ?lead.dedup_key.as_index_key(),
                elapsed_micros = start.elapsed().as_micros() as u64,
                "ingest_success"
            );
            Ok(lead)
        }
        Err(err) => {
            warn!(
                error = %err,
                elapsed_micros = start.elapsed().as_micros() as u64,
                "ingest_failure"
            );
            Err(err)
        }
    }
}

fn ingest_inner(
    raw: RawLeadSubmission,
    scope: &str,
    cfg: &IngestConfig,
) -> Result<CanonicalLead, IngestError> {
    // Snapshot before any mutation so the payload reflects the wire shape.
    let payload = serde_json::to_value(&raw).unwrap_or(serde_json::Value::Null);

    if let Some(limit) = cfg.max_payload_bytes {
        let size = payload.to_string().len();
        if size > limit {
            return Err(IngestError::PayloadTooLarge { size, limit });
        }
    }

    let strip = cfg.strip_control_chars;
    let first_name = required("firstName", &raw.first_name, strip)?;
    let last_name = required("lastName", &raw.last_name, strip)?;
    let email = required("email", &raw.email, strip)?;
    let source = required("source", &raw.source, strip)?;
    let email_key = email.to_lowercase();

    let mut invalid_phone_kept = false;
    let phone = match raw.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => match phone::normalize(p) {
            Ok(canonical) => Some(canonical),
            Err(err) => match cfg.invalid_phone_policy {
                InvalidPhonePolicy::Reject => return Err(IngestError::InvalidPhone(err)),
                InvalidPhonePolicy::AcceptWithoutDedup => {
                    invalid_phone_kept = true;
                    None
                }
            },
        },
        None => None,
    };

    let dedup_key = match &phone {
        Some(p) => DedupKey::Phone(p.clone()),
        // A kept-but-unparseable phone must not silently dedupe on email:
        // the submitter asserted an identity we could not read.
        None if invalid_phone_kept => DedupKey::None,
        None => match cfg.phoneless_dedup {
            PhonelessDedup::Email => DedupKey::Email(email_key.clone()),
            PhonelessDedup::Never => DedupKey::None,
        },
    };

    let zip = match raw.zip_code.as_deref().map(str::trim).filter(|z| !z.is_empty()) {
        Some(z) => Some(
            phone::normalize_zip(z).map_err(|_| IngestError::InvalidZip(z.to_string()))?,
        ),
        None => None,
    };

    let state = match raw.state.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(
            phone::normalize_state(s).map_err(|_| IngestError::InvalidState(s.to_string()))?,
        ),
        None => None,
    };

    let product_type = raw
        .product_type
        .as_deref()
        .map(|p| sanitize(p, strip))
        .filter(|p| !p.is_empty());

    Ok(CanonicalLead {
        scope: scope.to_string(),
        first_name,
        last_name,
        email,
        email_key,
        source,
        kind: raw.kind,
        phone,
        dedup_key,
        product_type,
        zip,
        state,
        address: raw.address.map(|a| sanitize(&a, strip)).filter(|a| !a.is_empty()),
        city: raw.city.map(|c| sanitize(&c, strip)).filter(|c| !c.is_empty()),
        payload,
        received_at: Utc::now(),
    })
}

fn required(
    name: &'static str,
    value: &str,
    strip: bool,
) -> Result<String, IngestError> {
    let value = sanitize(value, strip);
    if value.is_empty() {
        Err(IngestError::MissingField(name))
    } else {
        Ok(value)
    }
}

fn sanitize(value: &str, strip_control_chars: bool) -> String {
    let trimmed = value.trim();
    if strip_control_chars {
        trimmed.chars().filter(|c| !c.is_control()).collect()
    } else {
        trimmed.to_string()
    }
}
