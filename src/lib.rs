//! Workspace umbrella crate for LeadRelay.
//!
//! This crate stitches together lead ingestion, contact resolution, rule
//! evaluation, and dispatch enqueueing so callers can process an inbound
//! submission with a single API entry point: [`process_lead`].
//!
//! The pipeline is deliberately short and synchronous — everything up to and
//! including lead persistence happens on the caller's request, then matched
//! forwards are handed to the background dispatcher and the call returns.
//! A dispatch failure can never roll back a persisted lead or contact.

pub use dispatch::{
    make_job, outbound_payload, set_dispatch_metrics, DispatchConfig, DispatchError,
    DispatchHandle, DispatchJob, DispatchMetrics, Dispatcher, RetryConfig,
};
pub use ingest::{
    ingest, CanonicalLead, DedupKey, IngestConfig, IngestError, InvalidPhonePolicy, LeadKind,
    PhonelessDedup, RawLeadSubmission,
};
pub use matcher::{
    criteria_match, match_forwarding, match_routing, matched_criteria, Criterion, ForwardTarget,
    ForwardingRule, LeadFacts, MatchedCriteria, RoutingRule, RuleCriteria, RuleError,
};
pub use phone::{normalize as normalize_phone, normalize_state, normalize_zip, PhoneError};
pub use store::{
    BackendConfig, Contact, ForwardLogEntry, ForwardOutcome, ForwardStats, Lead, LeadStore,
    StoreBackend, StoreConfig, StoreError,
};

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};
use tracing::warn;

/// Errors that can occur while processing an inbound submission.
///
/// Only validation (`Ingest`) and persistence (`Store`) can fail here —
/// forwarding failures happen later, on the dispatch worker, and surface
/// through the audit log instead of this result.
#[derive(Debug)]
pub enum PipelineError {
    Ingest(IngestError),
    Store(StoreError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Ingest(err) => write!(f, "ingest failure: {err}"),
            PipelineError::Store(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Ingest(err) => Some(err),
            PipelineError::Store(err) => Some(err),
        }
    }
}

impl From<IngestError> for PipelineError {
    fn from(value: IngestError) -> Self {
        PipelineError::Ingest(value)
    }
}

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        PipelineError::Store(value)
    }
}

/// Metrics observer for pipeline stages.
pub trait PipelineMetrics: Send + Sync {
    fn record_ingest(&self, latency: Duration, ok: bool);
    fn record_resolve(&self, latency: Duration, is_new: bool);
    fn record_route(&self, latency: Duration, matched: bool);
}

/// Install or clear the global pipeline metrics recorder.
pub fn set_pipeline_metrics(recorder: Option<Arc<dyn PipelineMetrics>>) {
    let lock = metrics_lock();
    let mut guard = lock.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PipelineMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn PipelineMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn PipelineMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Pipeline-level configuration: the ingest knobs travel with every call;
/// dispatch configuration lives with the dispatcher itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Whether ingestion resolved to a brand-new contact or an existing one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    New,
    Existing,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::Existing => "existing",
        }
    }
}

/// Result of processing one inbound submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadOutcome {
    pub contact_id: u64,
    pub lead_id: u64,
    pub contact_status: ContactStatus,
    /// Workspace assigned by the first matching routing rule, if any.
    pub workspace_id: Option<String>,
    /// Forwarding jobs handed to the dispatcher (delivery itself is async).
    pub forwards_enqueued: usize,
}

/// Process one inbound submission end-to-end:
/// ingest → resolve contact → persist lead → route → enqueue forwards.
///
/// Rule evaluation runs over one consistent snapshot of the scope's rules.
/// Forwarding is fire-and-forget from the caller's perspective: jobs for
/// every matched rule (including active-but-disabled ones, which the
/// dispatcher logs as `skipped`) are enqueued and the call returns without
/// waiting on any delivery. Passing `None` for `dispatch` (e.g. in tests or
/// an ingest-only deployment) skips enqueueing but still counts matches.
pub fn process_lead(
    raw: RawLeadSubmission,
    scope: &str,
    cfg: &PipelineConfig,
    store: &LeadStore,
    dispatch: Option<&DispatchHandle>,
) -> Result<LeadOutcome, PipelineError> {
    let recorder = metrics_recorder();

    let start = Instant::now();
    let lead = match ingest(raw, scope, &cfg.ingest) {
        Ok(lead) => {
            if let Some(r) = &recorder {
                r.record_ingest(start.elapsed(), true);
            }
            lead
        }
        Err(err) => {
            if let Some(r) = &recorder {
                r.record_ingest(start.elapsed(), false);
            }
            return Err(err.into());
        }
    };

    let start = Instant::now();
    let (contact, is_new) = store.resolve_contact(&lead)?;
    if let Some(r) = &recorder {
        r.record_resolve(start.elapsed(), is_new);
    }

    let mut record = store.insert_lead(&lead, contact.id)?;

    let start = Instant::now();
    let facts = LeadFacts::from_lead(&lead);
    let routing_rules = store.routing_rules(&lead.scope)?;
    let routed = match_routing(&routing_rules, facts);
    if let Some(rule) = routed {
        record = store.set_lead_workspace(record.id, &rule.workspace_id)?;
    }
    if let Some(r) = &recorder {
        r.record_route(start.elapsed(), routed.is_some());
    }

    let forwarding_rules = store.forwarding_rules(&lead.scope)?;
    let matches = match_forwarding(&forwarding_rules, facts);
    let mut forwards_enqueued = 0;
    for rule in &matches {
        let matched = matched_criteria(&rule.criteria, facts);
        match dispatch {
            Some(handle) => {
                let job = make_job(&record, &contact, rule, matched);
                if handle.enqueue(job) {
                    forwards_enqueued += 1;
                } else {
                    warn!(
                        scope = %lead.scope,
                        lead_id = record.id,
                        rule_id = rule.id,
                        "dispatch queue closed; forward not enqueued"
                    );
                }
            }
            None => forwards_enqueued += 1,
        }
    }

    Ok(LeadOutcome {
        contact_id: contact.id,
        lead_id: record.id,
        contact_status: if is_new {
            ContactStatus::New
        } else {
            ContactStatus::Existing
        },
        workspace_id: record.workspace_id,
        forwards_enqueued,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn raw(phone: &str) -> RawLeadSubmission {
        serde_json::from_value(json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "source": "google-ads",
            "phone": phone,
            "productType": "Solar",
            "zipCode": "90210",
            "state": "CA",
        }))
        .unwrap()
    }

    #[test]
    fn pipeline_reports_new_then_existing_contact() {
        let store = LeadStore::in_memory();
        let cfg = PipelineConfig::default();

        let first = process_lead(raw("5551234567"), "wh-1", &cfg, &store, None).unwrap();
        assert_eq!(first.contact_status, ContactStatus::New);

        let second = process_lead(raw("(555) 123-4567"), "wh-1", &cfg, &store, None).unwrap();
        assert_eq!(second.contact_status, ContactStatus::Existing);
        assert_eq!(first.contact_id, second.contact_id);
        assert_ne!(first.lead_id, second.lead_id);
    }

    #[test]
    fn routing_assigns_workspace_from_first_match() {
        let store = LeadStore::in_memory();
        store
            .put_routing_rule(RoutingRule {
                id: 0,
                scope: "wh-1".into(),
                name: "solar".into(),
                criteria: RuleCriteria {
                    product_types: Criterion::exact(["Solar"]),
                    zip_codes: Criterion::Wildcard,
                    states: Criterion::Wildcard,
                },
                priority: 1,
                is_active: true,
                workspace_id: "ws-solar".into(),
                created_at: Utc::now(),
            })
            .unwrap();

        let outcome =
            process_lead(raw("5551234567"), "wh-1", &PipelineConfig::default(), &store, None)
                .unwrap();
        assert_eq!(outcome.workspace_id.as_deref(), Some("ws-solar"));

        let lead = store.get_lead(outcome.lead_id).unwrap().unwrap();
        assert_eq!(lead.workspace_id.as_deref(), Some("ws-solar"));
    }

    #[test]
    fn unmatched_lead_stays_unassigned() {
        let store = LeadStore::in_memory();
        let outcome =
            process_lead(raw("5551234567"), "wh-1", &PipelineConfig::default(), &store, None)
                .unwrap();
        assert!(outcome.workspace_id.is_none());
        assert_eq!(outcome.forwards_enqueued, 0);
    }

    #[test]
    fn validation_error_persists_nothing() {
        let store = LeadStore::in_memory();
        let err = process_lead(raw("123"), "wh-1", &PipelineConfig::default(), &store, None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Ingest(_)));
        assert!(store.contacts("wh-1").unwrap().is_empty());
    }

    #[test]
    fn forwarding_matches_counted_without_dispatcher() {
        let store = LeadStore::in_memory();
        for (name, product) in [("all", "*"), ("solar", "Solar")] {
            let mut rule = ForwardingRule {
                id: 0,
                scope: "wh-1".into(),
                name: name.into(),
                criteria: RuleCriteria {
                    product_types: if product == "*" {
                        Criterion::Wildcard
                    } else {
                        Criterion::exact([product])
                    },
                    zip_codes: Criterion::Wildcard,
                    states: Criterion::Wildcard,
                },
                priority: 1,
                is_active: true,
                forward_enabled: true,
                target: ForwardTarget {
                    id: format!("target-{name}"),
                    url: "https://example.com/hook".into(),
                },
                created_at: Utc::now(),
            };
            rule.validate().unwrap();
            store.put_forwarding_rule(rule).unwrap();
        }

        let outcome =
            process_lead(raw("5551234567"), "wh-1", &PipelineConfig::default(), &store, None)
                .unwrap();
        assert_eq!(outcome.forwards_enqueued, 2);
    }
}
