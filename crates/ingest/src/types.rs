//! Core data model types for the ingest crate.
//!
//! These types represent the shape of inbound lead submissions and the
//! normalized records that flow to downstream stages. They are designed to be:
//!
//! - **Serializable**: JSON in and out via serde
//! - **Cloneable**: cheap to clone for pipeline processing
//! - **Comparable**: equality checks for testing
//!
//! # Type Hierarchy
//!
//! ```text
//! RawLeadSubmission
//! ├── first_name / last_name / email / source   (required)
//! ├── phone / product_type / zip_code / state   (optional)
//! ├── address / city / kind                     (optional)
//! └── extra: Map<String, Value>                 (everything else, flattened)
//!
//!         ↓ ingest()
//!
//! CanonicalLead
//! ├── scope: String                  (originating webhook namespace)
//! ├── dedup_key: DedupKey            (Phone | Email | None)
//! ├── phone: Option<String>          (+1XXXXXXXXXX)
//! ├── zip: Option<String>            (5-digit comparison form)
//! ├── state: Option<String>          (uppercase 2-letter)
//! ├── product_type: Option<String>   (case-preserved)
//! └── payload: Value                 (raw submission snapshot)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of inbound event. Routing and forwarding treat both identically; the
/// distinction exists so downstream workspaces can render calendars vs tables.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LeadKind {
    #[default]
    Lead,
    Appointment,
}

/// An inbound lead submission exactly as posted to `POST /webhook/{id}`.
///
/// `first_name`, `last_name`, `email`, and `source` are required; everything
/// else is optional. Unknown fields are captured in `extra` rather than
/// rejected, and the full submission is snapshotted into
/// [`CanonicalLead::payload`] so forwarding can replay the original shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawLeadSubmission {
    #[serde(rename = "firstName")]
    pub first_name: String,

    #[serde(rename = "lastName")]
    pub last_name: String,

    pub email: String,

    /// Originating provider tag (e.g. an ad network name). Distinct from the
    /// scope, which is the webhook the submission arrived on.
    pub source: String,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default, rename = "productType")]
    pub product_type: Option<String>,

    #[serde(default, rename = "zipCode")]
    pub zip_code: Option<String>,

    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    #[serde(default)]
    pub kind: LeadKind,

    /// Any additional fields the submitter sent.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Identity key used for contact deduplication within a scope.
///
/// Exactly one non-deleted contact exists per `(scope, key)` pair for the
/// `Phone` and `Email` variants. `None` means the lead gets a fresh contact
/// with no dedup (phoneless submission under [`PhonelessDedup::Never`], or an
/// accepted-but-invalid phone under [`InvalidPhonePolicy::AcceptWithoutDedup`]).
///
/// [`PhonelessDedup::Never`]: crate::PhonelessDedup::Never
/// [`InvalidPhonePolicy::AcceptWithoutDedup`]: crate::InvalidPhonePolicy::AcceptWithoutDedup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DedupKey {
    /// Canonical `+1XXXXXXXXXX` phone.
    Phone(String),
    /// Lowercased email.
    Email(String),
    /// No deduplication for this lead.
    None,
}

impl DedupKey {
    /// Stable string form used as a storage index key component.
    pub fn as_index_key(&self) -> Option<String> {
        match self {
            DedupKey::Phone(p) => Some(format!("phone:{p}")),
            DedupKey::Email(e) => Some(format!("email:{e}")),
            DedupKey::None => None,
        }
    }
}

/// Normalized lead produced by [`ingest`](crate::ingest).
///
/// Guarantees:
///
/// - Required fields are present and sanitized (control characters stripped).
/// - `phone` is canonical `+1XXXXXXXXXX` when present.
/// - `zip` is the 5-digit comparison form; `state` is uppercase 2-letter.
/// - `dedup_key` is fully derived — downstream never re-derives identity.
/// - `payload` preserves the original submission for audit and forwarding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalLead {
    /// Originating webhook namespace; dedup and rule evaluation are confined
    /// to this scope.
    pub scope: String,

    pub first_name: String,
    pub last_name: String,

    /// Original-case email for display; `email_key` is the dedup form.
    pub email: String,

    /// Lowercased email used for phoneless dedup.
    pub email_key: String,

    pub source: String,

    pub kind: LeadKind,

    pub phone: Option<String>,

    pub dedup_key: DedupKey,

    pub product_type: Option<String>,

    pub zip: Option<String>,

    pub state: Option<String>,

    pub address: Option<String>,

    pub city: Option<String>,

    /// Snapshot of the raw submission as received.
    pub payload: Value,

    pub received_at: DateTime<Utc>,
}
