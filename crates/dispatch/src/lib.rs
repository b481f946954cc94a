//! # Lead Dispatch
//!
//! Outbound webhook delivery for matched forwarding rules. Runs off the
//! ingestion critical path: the ingestion request enqueues jobs and returns;
//! delivery, retries, and audit logging happen on a background worker.
//!
//! ## Delivery semantics
//!
//! - **At-least-once**: a timed-out attempt may have been accepted by the
//!   target; the local log still records a failure and the retry may deliver
//!   again. The log makes every attempt visible for manual reconciliation.
//! - **Checked at dispatch time, not match time**: the master toggle and the
//!   rule's `forward_enabled` flag are re-read from the store when the job is
//!   processed, so disabling either takes effect immediately for queued and
//!   retrying deliveries. Skips are logged, never silently dropped.
//! - **Bounded retries**: failed attempts (non-2xx, timeout, connect error)
//!   are re-enqueued after an exponential backoff delay up to
//!   [`RetryConfig::max_retries`]; the terminal attempt logs `failed`.
//! - **Independent targets**: each job is its own task; one target's retries
//!   never delay delivery to another.
//! - **Duplicate-target safeguard**: when two rules with different criteria
//!   point at the same target, only the first claims the `(lead, target)`
//!   slot; the second logs `skipped`.
//!
//! ## Shape
//!
//! [`Dispatcher::spawn`] builds the HTTP client, starts the worker loop, and
//! returns a cheap-to-clone [`DispatchHandle`]. Retries re-enter the same
//! queue via a weak sender, so dropping every handle shuts the worker down
//! (in-flight attempts finish and are logged; nothing new fires).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use matcher::{ForwardingRule, MatchedCriteria};
use store::{Contact, ForwardLogEntry, ForwardOutcome, Lead, LeadStore};

mod metrics;
mod retry;
mod serde_millis;

pub use crate::metrics::{set_dispatch_metrics, DispatchMetrics};
pub use crate::retry::RetryConfig;

use crate::metrics::metrics_recorder;

/// Errors surfaced when constructing a dispatcher.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Configuration for the dispatch worker.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Per-attempt HTTP timeout, in milliseconds.
    #[serde(with = "crate::serde_millis", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Static User-Agent sent on every delivery.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Header carrying the originating scope on every delivery.
    #[serde(default = "default_source_header")]
    pub source_header: String,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-lead dedup-by-target safeguard (skip a second rule pointing at a
    /// target that already received this lead).
    #[serde(default = "default_true")]
    pub dedup_targets: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            source_header: default_source_header(),
            retry: RetryConfig::default(),
            dedup_targets: default_true(),
        }
    }
}

impl DispatchConfig {
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_dedup_targets(mut self, dedup: bool) -> Self {
        self.dedup_targets = dedup;
        self
    }
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    concat!("leadrelay/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_source_header() -> String {
    "x-lead-source".to_string()
}

fn default_true() -> bool {
    true
}

/// One queued delivery: a matched rule plus everything needed to POST and to
/// write log entries without touching the lead row again.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub scope: String,
    pub lead_id: u64,
    pub contact_id: u64,
    pub rule: ForwardingRule,
    pub matched: MatchedCriteria,
    /// Normalized outbound body (see [`outbound_payload`]).
    pub payload: Value,
    /// Prior attempts for this logical delivery; 0 on first enqueue.
    pub attempt: u32,
}

/// Build the normalized JSON body delivered to forwarding targets.
///
/// Independent of the inbound payload shape: lead identity, contact
/// reference, matched criteria, and the raw submission snapshot under
/// `payload`.
pub fn outbound_payload(lead: &Lead, contact: &Contact, matched: &MatchedCriteria) -> Value {
    json!({
        "lead_id": lead.id,
        "contact_id": contact.id,
        "scope": lead.scope,
        "kind": lead.kind,
        "source": lead.source,
        "contact": {
            "firstName": contact.first_name,
            "lastName": contact.last_name,
            "email": contact.email,
            "phone": contact.phone,
        },
        "productType": lead.product_type,
        "zipCode": lead.zip,
        "state": lead.state,
        "matched_criteria": matched,
        "payload": lead.payload,
    })
}

/// Cheap-to-clone producer side of the dispatch queue.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<DispatchJob>,
}

impl DispatchHandle {
    /// Enqueue a delivery without blocking. Returns `false` if the worker has
    /// shut down (the job is dropped and the caller's lead is unaffected).
    pub fn enqueue(&self, job: DispatchJob) -> bool {
        self.tx.send(job).is_ok()
    }
}

struct WorkerCtx {
    store: Arc<LeadStore>,
    cfg: DispatchConfig,
    client: reqwest::Client,
    /// Weak so the queue closes when every external handle is dropped;
    /// pending retries on a closed queue are abandoned with a warning.
    retry_tx: mpsc::WeakUnboundedSender<DispatchJob>,
}

/// The dispatch worker. Construct with [`Dispatcher::spawn`].
pub struct Dispatcher;

impl Dispatcher {
    /// Build the HTTP client and start the worker loop on the current tokio
    /// runtime.
    pub fn spawn(
        store: Arc<LeadStore>,
        cfg: DispatchConfig,
    ) -> Result<DispatchHandle, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(|e| DispatchError::Client(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(WorkerCtx {
            store,
            cfg,
            client,
            retry_tx: tx.downgrade(),
        });

        tokio::spawn(worker_loop(rx, ctx));
        Ok(DispatchHandle { tx })
    }
}

async fn worker_loop(mut rx: mpsc::UnboundedReceiver<DispatchJob>, ctx: Arc<WorkerCtx>) {
    while let Some(job) = rx.recv().await {
        // One task per job: targets deliver independently and in parallel.
        let ctx = ctx.clone();
        tokio::spawn(async move {
            process_job(&ctx, job).await;
        });
    }
    debug!("dispatch worker loop stopped");
}

async fn process_job(ctx: &WorkerCtx, job: DispatchJob) {
    let scope = job.scope.clone();

    // Master toggle, read fresh so a flip takes effect for in-flight jobs.
    match ctx.store.forwarding_enabled(&scope) {
        Ok(true) => {}
        Ok(false) => {
            record_skip(ctx, &job, "forwarding disabled for scope");
            return;
        }
        Err(err) => {
            error!(scope = %scope, error = %err, "toggle read failed; dropping dispatch");
            return;
        }
    }

    // Re-read the rule: deletion or a disable since match time must win.
    let rule = match ctx.store.get_forwarding_rule(&scope, job.rule.id) {
        Ok(Some(rule)) => rule,
        Ok(None) => {
            record_skip(ctx, &job, "rule deleted before dispatch");
            return;
        }
        Err(err) => {
            error!(scope = %scope, rule_id = job.rule.id, error = %err, "rule read failed; dropping dispatch");
            return;
        }
    };
    if !rule.is_active || !rule.forward_enabled {
        record_skip(ctx, &job, "rule disabled");
        return;
    }

    if ctx.cfg.dedup_targets {
        match ctx
            .store
            .claim_forward_target(&scope, job.lead_id, &rule.target.id, rule.id)
        {
            Ok(None) => {}
            Ok(Some(owner)) if owner == rule.id => {} // our own retry
            Ok(Some(owner)) => {
                record_skip(
                    ctx,
                    &job,
                    &format!("target already claimed by rule {owner}"),
                );
                return;
            }
            Err(err) => {
                error!(scope = %scope, error = %err, "target claim failed; dropping dispatch");
                return;
            }
        }
    }

    let start = Instant::now();
    let response = ctx
        .client
        .post(&rule.target.url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(ctx.cfg.source_header.as_str(), scope.as_str())
        .json(&job.payload)
        .send()
        .await;
    let latency = start.elapsed();

    let (http_status, failure) = match response {
        Ok(resp) if resp.status().is_success() => (Some(resp.status().as_u16()), None),
        Ok(resp) => {
            let status = resp.status().as_u16();
            (Some(status), Some(format!("target returned HTTP {status}")))
        }
        Err(err) if err.is_timeout() => (None, Some("request timed out".to_string())),
        Err(err) => (None, Some(format!("request failed: {err}"))),
    };

    match failure {
        None => {
            record_attempt(ctx, &job, &rule, ForwardOutcome::Success, http_status, None, latency);
            if let Err(err) = ctx.store.increment_rule_forward_count(&scope, rule.id) {
                warn!(scope = %scope, rule_id = rule.id, error = %err, "forward counter update failed");
            }
            info!(
                scope = %scope,
                lead_id = job.lead_id,
                rule_id = rule.id,
                target = %rule.target.id,
                attempt = job.attempt,
                "forward delivered"
            );
        }
        Some(reason) => {
            if job.attempt < ctx.cfg.retry.max_retries {
                record_attempt(
                    ctx,
                    &job,
                    &rule,
                    ForwardOutcome::Retry,
                    http_status,
                    Some(reason.clone()),
                    latency,
                );
                schedule_retry(ctx, job, reason);
            } else {
                record_attempt(
                    ctx,
                    &job,
                    &rule,
                    ForwardOutcome::Failed,
                    http_status,
                    Some(reason.clone()),
                    latency,
                );
                warn!(
                    scope = %scope,
                    lead_id = job.lead_id,
                    rule_id = rule.id,
                    target = %rule.target.id,
                    retries = job.attempt,
                    reason = %reason,
                    "forward failed terminally"
                );
            }
        }
    }
}

fn schedule_retry(ctx: &WorkerCtx, job: DispatchJob, reason: String) {
    let next_attempt = job.attempt + 1;
    let delay = ctx.cfg.retry.calculate_delay(next_attempt);
    let retry_tx = ctx.retry_tx.clone();
    let scope = job.scope.clone();

    debug!(
        scope = %scope,
        lead_id = job.lead_id,
        rule_id = job.rule.id,
        attempt = next_attempt,
        delay_ms = delay.as_millis() as u64,
        reason = %reason,
        "forward retry scheduled"
    );

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let retried = DispatchJob {
            attempt: next_attempt,
            ..job
        };
        match retry_tx.upgrade() {
            Some(tx) => {
                if tx.send(retried).is_err() {
                    warn!(scope = %scope, "dispatch queue closed; retry abandoned");
                }
            }
            None => warn!(scope = %scope, "dispatch queue closed; retry abandoned"),
        }
    });
}

fn record_skip(ctx: &WorkerCtx, job: &DispatchJob, reason: &str) {
    debug!(
        scope = %job.scope,
        lead_id = job.lead_id,
        rule_id = job.rule.id,
        reason = %reason,
        "forward skipped"
    );
    record_attempt(
        ctx,
        job,
        &job.rule,
        ForwardOutcome::Skipped,
        None,
        Some(reason.to_string()),
        Duration::ZERO,
    );
}

fn record_attempt(
    ctx: &WorkerCtx,
    job: &DispatchJob,
    rule: &ForwardingRule,
    outcome: ForwardOutcome,
    http_status: Option<u16>,
    error_msg: Option<String>,
    latency: Duration,
) {
    ::metrics::counter!(
        "leadrelay_forward_attempts_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    if let Some(recorder) = metrics_recorder() {
        recorder.record_attempt(&job.scope, outcome, latency);
    }

    let entry = ForwardLogEntry {
        id: 0,
        scope: job.scope.clone(),
        lead_id: job.lead_id,
        contact_id: job.contact_id,
        rule_id: rule.id,
        rule_name: rule.name.clone(),
        target_id: rule.target.id.clone(),
        target_url: rule.target.url.clone(),
        outcome,
        http_status,
        error: error_msg,
        retry_count: job.attempt,
        matched: serde_json::to_value(&job.matched).unwrap_or(Value::Null),
        payload: job.payload.clone(),
        attempted_at: Utc::now(),
    };

    // Audit writes never propagate back to ingestion.
    if let Err(err) = ctx.store.append_forward_log(entry) {
        error!(
            scope = %job.scope,
            lead_id = job.lead_id,
            error = %err,
            "forward log append failed"
        );
    }
}

/// Convenience for callers that already hold everything a job needs.
pub fn make_job(
    lead: &Lead,
    contact: &Contact,
    rule: &ForwardingRule,
    matched: MatchedCriteria,
) -> DispatchJob {
    DispatchJob {
        scope: lead.scope.clone(),
        lead_id: lead.id,
        contact_id: contact.id,
        payload: outbound_payload(lead, contact, &matched),
        rule: rule.clone(),
        matched,
        attempt: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use matcher::{ForwardTarget, RuleCriteria};

    fn sample_lead() -> Lead {
        Lead {
            id: 4,
            contact_id: 1,
            scope: "wh-1".into(),
            kind: ingest_kind(),
            source: "google-ads".into(),
            product_type: Some("Solar".into()),
            zip: Some("90210".into()),
            state: Some("CA".into()),
            status: "new".into(),
            workspace_id: None,
            payload: json!({"firstName": "Ada"}),
            created_at: Utc::now(),
        }
    }

    fn ingest_kind() -> ingest::LeadKind {
        ingest::LeadKind::Lead
    }

    fn sample_contact() -> Contact {
        Contact {
            id: 1,
            scope: "wh-1".into(),
            phone: Some("+15551234567".into()),
            email: "ada@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            address: None,
            city: None,
            created_at: Utc::now(),
        }
    }

    fn sample_rule() -> ForwardingRule {
        ForwardingRule {
            id: 7,
            scope: "wh-1".into(),
            name: "crm-feed".into(),
            criteria: RuleCriteria::any(),
            priority: 1,
            is_active: true,
            forward_enabled: true,
            target: ForwardTarget {
                id: "crm".into(),
                url: "https://crm.example.com/hook".into(),
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn outbound_payload_carries_identity_and_snapshot() {
        let matched = MatchedCriteria {
            product_type: "Solar".into(),
            zip: "90210".into(),
            state: "*".into(),
        };
        let body = outbound_payload(&sample_lead(), &sample_contact(), &matched);

        assert_eq!(body["lead_id"], json!(4));
        assert_eq!(body["contact_id"], json!(1));
        assert_eq!(body["contact"]["phone"], json!("+15551234567"));
        assert_eq!(body["matched_criteria"]["state"], json!("*"));
        assert_eq!(body["payload"]["firstName"], json!("Ada"));
    }

    #[test]
    fn make_job_starts_at_attempt_zero() {
        let matched = MatchedCriteria {
            product_type: "*".into(),
            zip: "*".into(),
            state: "*".into(),
        };
        let job = make_job(&sample_lead(), &sample_contact(), &sample_rule(), matched);
        assert_eq!(job.attempt, 0);
        assert_eq!(job.lead_id, 4);
        assert_eq!(job.rule.id, 7);
    }

    #[tokio::test]
    async fn spawned_dispatcher_accepts_jobs() {
        let store = Arc::new(LeadStore::in_memory());
        let handle = Dispatcher::spawn(store, DispatchConfig::default()).unwrap();
        let job = make_job(
            &sample_lead(),
            &sample_contact(),
            &sample_rule(),
            MatchedCriteria {
                product_type: "*".into(),
                zip: "*".into(),
                state: "*".into(),
            },
        );
        assert!(handle.enqueue(job));
    }
}
