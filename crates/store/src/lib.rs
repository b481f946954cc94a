//! # Lead Store
//!
//! Backend-agnostic persistence for the lead engine: contacts, leads,
//! routing/forwarding rules, the per-scope master toggle, and the append-only
//! forwarding audit log.
//!
//! ## Core Features
//!
//! - **Pluggable backends** through the [`StoreBackend`] trait: an in-memory
//!   map for tests and ephemeral use, and a redb file for persistence
//!   (enabled via the default `backend-redb` feature).
//! - **Race-free contact deduplication**: [`LeadStore::resolve_contact`] is
//!   an atomic insert-or-fetch over the `(scope, dedup key)` unique index.
//!   The dedup index entry is only published *after* the contact row exists,
//!   so a losing writer that observes the index can always fetch the winner.
//! - **Consistent rule snapshots**: [`LeadStore::routing_rules`] and
//!   [`LeadStore::forwarding_rules`] read the whole scope under one backend
//!   snapshot and return rules in `(priority asc, id asc)` order.
//! - **Append-only audit log**: every delivery attempt becomes its own
//!   immutable [`ForwardLogEntry`]; aggregation and pagination happen at read
//!   time.
//!
//! ## Example
//!
//! ```
//! use lead_store::{LeadStore, StoreConfig, BackendConfig};
//!
//! let store = LeadStore::new(StoreConfig::new().with_backend(BackendConfig::in_memory())).unwrap();
//! assert!(store.forwarding_enabled("wh-1").unwrap()); // toggle defaults on
//! ```

mod backend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use ingest::{CanonicalLead, LeadKind};
use matcher::{ForwardingRule, RoutingRule};

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, InMemoryBackend, StoreBackend};

/// Bump whenever the on-disk record layout changes.
pub const STORE_SCHEMA_VERSION: u16 = 1;

/// Errors produced by the storage layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Underlying backend failure (I/O, transaction, corruption).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Record failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(String),

    /// A referenced record is gone — e.g. a contact deleted by an admin
    /// cascade between resolution and use. Late error, not a crash.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        StoreError::Backend(msg.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

/// The deduplicated identity of a person within a scope.
///
/// At most one non-deleted contact exists per `(scope, dedup key)`. Identity
/// fields are first-write-wins: later leads from the same person never
/// overwrite them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: u64,
    pub scope: String,
    /// Canonical `+1XXXXXXXXXX` phone, when the first lead carried one.
    pub phone: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One inquiry/event, always owned by a contact.
///
/// Immutable once created except for `status` and `workspace_id`, which the
/// admin surface and routing assignment mutate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: u64,
    pub contact_id: u64,
    pub scope: String,
    pub kind: LeadKind,
    pub source: String,
    pub product_type: Option<String>,
    pub zip: Option<String>,
    pub state: Option<String>,
    pub status: String,
    /// Workspace assigned by the first matching routing rule, if any.
    pub workspace_id: Option<String>,
    /// Raw submission snapshot.
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ForwardOutcome {
    /// Target answered 2xx.
    Success,
    /// Terminal failure: non-2xx or transport error with retries exhausted.
    Failed,
    /// Failed attempt with a retry scheduled.
    Retry,
    /// Not attempted: master toggle off, rule disabled, or duplicate target.
    Skipped,
}

impl ForwardOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardOutcome::Success => "success",
            ForwardOutcome::Failed => "failed",
            ForwardOutcome::Retry => "retry",
            ForwardOutcome::Skipped => "skipped",
        }
    }
}

/// One record per delivery attempt — not per rule match. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardLogEntry {
    /// Assigned by the store on append.
    #[serde(default)]
    pub id: u64,
    pub scope: String,
    pub lead_id: u64,
    pub contact_id: u64,
    pub rule_id: u64,
    pub rule_name: String,
    pub target_id: String,
    pub target_url: String,
    pub outcome: ForwardOutcome,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    /// Prior attempts for the same logical delivery.
    pub retry_count: u32,
    /// Echo of which product/zip/state satisfied the rule.
    pub matched: Value,
    /// Outbound payload snapshot.
    pub payload: Value,
    pub attempted_at: DateTime<Utc>,
}

/// Aggregate counts over a scope's forwarding log.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub retry: u64,
    pub skipped: u64,
}

/// Store configuration; the backend choice is the only knob so far.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }
}

/// Key layout. Scopes arrive as single URL path segments so `/` is a safe
/// separator; ids are zero-padded so key order equals numeric order.
mod keys {
    pub fn seq(name: &str) -> String {
        format!("seq/{name}")
    }

    pub fn contact(id: u64) -> String {
        format!("contact/{id:020}")
    }

    pub fn contact_index(scope: &str, index_key: &str) -> String {
        format!("cindex/{scope}/{index_key}")
    }

    pub fn lead(id: u64) -> String {
        format!("lead/{id:020}")
    }

    pub fn routing_rule(scope: &str, id: u64) -> String {
        format!("{}{id:020}", routing_rule_prefix(scope))
    }

    pub fn routing_rule_prefix(scope: &str) -> String {
        format!("rule/route/{scope}/")
    }

    pub fn forwarding_rule(scope: &str, id: u64) -> String {
        format!("{}{id:020}", forwarding_rule_prefix(scope))
    }

    pub fn forwarding_rule_prefix(scope: &str) -> String {
        format!("rule/fwd/{scope}/")
    }

    pub fn toggle(scope: &str) -> String {
        format!("toggle/{scope}")
    }

    pub fn forward_log(scope: &str, id: u64) -> String {
        format!("{}{id:020}", forward_log_prefix(scope))
    }

    pub fn forward_log_prefix(scope: &str) -> String {
        format!("fwdlog/{scope}/")
    }

    pub fn rule_forward_count(scope: &str, rule_id: u64) -> String {
        format!("rulefwd/{scope}/{rule_id:020}")
    }

    pub fn target_claim(scope: &str, lead_id: u64, target_id: &str) -> String {
        format!("fwdclaim/{scope}/{lead_id:020}/{target_id}")
    }
}

/// High-level typed store over a pluggable backend.
pub struct LeadStore {
    backend: Box<dyn StoreBackend>,
}

impl LeadStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            backend: config.backend.build()?,
        })
    }

    /// Convenience constructor for tests and ephemeral deployments.
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(InMemoryBackend::new()),
        }
    }

    fn next_id(&self, name: &str) -> Result<u64, StoreError> {
        self.backend.incr(&keys::seq(name))
    }

    // ── Contacts ────────────────────────────────────────────────────────

    /// Find or create the one contact representing this lead's identity
    /// within its scope. Returns `(contact, is_new)`.
    ///
    /// This is an atomic insert-or-fetch, not a SELECT-then-INSERT: the
    /// candidate row is written first, then the dedup index entry is
    /// published with `put_if_absent`. If another writer won the index, our
    /// candidate row is discarded and the existing contact returned —
    /// identity fields are never overwritten by the newer submission.
    ///
    /// `DedupKey::None` leads always get a fresh contact (no index entry).
    pub fn resolve_contact(&self, lead: &CanonicalLead) -> Result<(Contact, bool), StoreError> {
        let id = self.next_id("contact")?;
        let candidate = Contact {
            id,
            scope: lead.scope.clone(),
            phone: lead.phone.clone(),
            email: lead.email.clone(),
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            address: lead.address.clone(),
            city: lead.city.clone(),
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&candidate)?;

        let Some(index_part) = lead.dedup_key.as_index_key() else {
            self.backend.put(&keys::contact(id), &bytes)?;
            return Ok((candidate, true));
        };
        let index_key = keys::contact_index(&lead.scope, &index_part);

        // Row before index: anyone who can see the index entry can fetch the row.
        self.backend.put(&keys::contact(id), &bytes)?;

        match self
            .backend
            .put_if_absent(&index_key, &id.to_be_bytes())?
        {
            None => Ok((candidate, true)),
            Some(existing) => {
                // Lost the race; drop our candidate and use the winner.
                self.backend.delete(&keys::contact(id))?;
                let existing_id = backend_u64(&existing)?;
                match self.get_contact(existing_id)? {
                    Some(contact) => Ok((contact, false)),
                    None => {
                        // Index points at a row removed by an admin cascade.
                        // Reclaim the identity with our candidate.
                        warn!(
                            scope = %lead.scope,
                            stale_contact_id = existing_id,
                            "stale contact index entry; reclaiming"
                        );
                        self.backend.put(&keys::contact(id), &bytes)?;
                        self.backend.put(&index_key, &id.to_be_bytes())?;
                        Ok((candidate, true))
                    }
                }
            }
        }
    }

    pub fn get_contact(&self, id: u64) -> Result<Option<Contact>, StoreError> {
        match self.backend.get(&keys::contact(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All contacts in a scope. Primarily a test/debug surface.
    pub fn contacts(&self, scope: &str) -> Result<Vec<Contact>, StoreError> {
        let mut out = Vec::new();
        self.backend.scan_prefix("contact/", &mut |_key, value| {
            let contact: Contact = serde_json::from_slice(value)?;
            if contact.scope == scope {
                out.push(contact);
            }
            Ok(())
        })?;
        Ok(out)
    }

    // ── Leads ───────────────────────────────────────────────────────────

    pub fn insert_lead(
        &self,
        lead: &CanonicalLead,
        contact_id: u64,
    ) -> Result<Lead, StoreError> {
        let id = self.next_id("lead")?;
        let record = Lead {
            id,
            contact_id,
            scope: lead.scope.clone(),
            kind: lead.kind,
            source: lead.source.clone(),
            product_type: lead.product_type.clone(),
            zip: lead.zip.clone(),
            state: lead.state.clone(),
            status: "new".to_string(),
            workspace_id: None,
            payload: lead.payload.clone(),
            created_at: lead.received_at,
        };
        self.backend
            .put(&keys::lead(id), &serde_json::to_vec(&record)?)?;
        Ok(record)
    }

    pub fn get_lead(&self, id: u64) -> Result<Option<Lead>, StoreError> {
        match self.backend.get(&keys::lead(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_lead_workspace(&self, id: u64, workspace_id: &str) -> Result<Lead, StoreError> {
        let mut lead = self
            .get_lead(id)?
            .ok_or(StoreError::NotFound { entity: "lead", id })?;
        lead.workspace_id = Some(workspace_id.to_string());
        self.backend
            .put(&keys::lead(id), &serde_json::to_vec(&lead)?)?;
        Ok(lead)
    }

    pub fn set_lead_status(&self, id: u64, status: &str) -> Result<Lead, StoreError> {
        let mut lead = self
            .get_lead(id)?
            .ok_or(StoreError::NotFound { entity: "lead", id })?;
        lead.status = status.to_string();
        self.backend
            .put(&keys::lead(id), &serde_json::to_vec(&lead)?)?;
        Ok(lead)
    }

    // ── Rules ───────────────────────────────────────────────────────────

    /// Create (id == 0) or replace a routing rule. Validation is the
    /// caller's job — the store persists what it is given.
    pub fn put_routing_rule(&self, mut rule: RoutingRule) -> Result<RoutingRule, StoreError> {
        if rule.id == 0 {
            rule.id = self.next_id("routing_rule")?;
        }
        self.backend.put(
            &keys::routing_rule(&rule.scope, rule.id),
            &serde_json::to_vec(&rule)?,
        )?;
        Ok(rule)
    }

    /// Consistent snapshot of a scope's routing rules in `(priority, id)`
    /// order.
    pub fn routing_rules(&self, scope: &str) -> Result<Vec<RoutingRule>, StoreError> {
        let mut rules: Vec<RoutingRule> = Vec::new();
        self.backend
            .scan_prefix(&keys::routing_rule_prefix(scope), &mut |_key, value| {
                rules.push(serde_json::from_slice(value)?);
                Ok(())
            })?;
        rules.sort_by_key(|r| (r.priority, r.id));
        Ok(rules)
    }

    pub fn delete_routing_rule(&self, scope: &str, id: u64) -> Result<bool, StoreError> {
        let key = keys::routing_rule(scope, id);
        let existed = self.backend.get(&key)?.is_some();
        if existed {
            self.backend.delete(&key)?;
        }
        Ok(existed)
    }

    pub fn put_forwarding_rule(
        &self,
        mut rule: ForwardingRule,
    ) -> Result<ForwardingRule, StoreError> {
        if rule.id == 0 {
            rule.id = self.next_id("forwarding_rule")?;
        }
        self.backend.put(
            &keys::forwarding_rule(&rule.scope, rule.id),
            &serde_json::to_vec(&rule)?,
        )?;
        Ok(rule)
    }

    pub fn forwarding_rules(&self, scope: &str) -> Result<Vec<ForwardingRule>, StoreError> {
        let mut rules: Vec<ForwardingRule> = Vec::new();
        self.backend
            .scan_prefix(&keys::forwarding_rule_prefix(scope), &mut |_key, value| {
                rules.push(serde_json::from_slice(value)?);
                Ok(())
            })?;
        rules.sort_by_key(|r| (r.priority, r.id));
        Ok(rules)
    }

    pub fn get_forwarding_rule(
        &self,
        scope: &str,
        id: u64,
    ) -> Result<Option<ForwardingRule>, StoreError> {
        match self.backend.get(&keys::forwarding_rule(scope, id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete_forwarding_rule(&self, scope: &str, id: u64) -> Result<bool, StoreError> {
        let key = keys::forwarding_rule(scope, id);
        let existed = self.backend.get(&key)?.is_some();
        if existed {
            self.backend.delete(&key)?;
        }
        Ok(existed)
    }

    // ── Master toggle ───────────────────────────────────────────────────

    /// Per-scope kill switch. Defaults to `true` for scopes never toggled.
    pub fn forwarding_enabled(&self, scope: &str) -> Result<bool, StoreError> {
        match self.backend.get(&keys::toggle(scope))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(true),
        }
    }

    /// Last-writer-wins update; read fresh at every dispatch decision.
    pub fn set_forwarding_enabled(&self, scope: &str, enabled: bool) -> Result<(), StoreError> {
        self.backend
            .put(&keys::toggle(scope), &serde_json::to_vec(&enabled)?)
    }

    // ── Forwarding log ──────────────────────────────────────────────────

    /// Append one attempt record. The id is assigned here; entries are never
    /// mutated afterwards.
    pub fn append_forward_log(
        &self,
        mut entry: ForwardLogEntry,
    ) -> Result<ForwardLogEntry, StoreError> {
        entry.id = self.next_id("forward_log")?;
        self.backend.put(
            &keys::forward_log(&entry.scope, entry.id),
            &serde_json::to_vec(&entry)?,
        )?;
        Ok(entry)
    }

    /// Paginated log entries for a scope, newest first, optionally filtered
    /// by outcome.
    pub fn forward_logs(
        &self,
        scope: &str,
        outcome: Option<ForwardOutcome>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ForwardLogEntry>, StoreError> {
        let mut entries: Vec<ForwardLogEntry> = Vec::new();
        self.backend
            .scan_prefix(&keys::forward_log_prefix(scope), &mut |_key, value| {
                let entry: ForwardLogEntry = serde_json::from_slice(value)?;
                if outcome.is_none_or(|o| entry.outcome == o) {
                    entries.push(entry);
                }
                Ok(())
            })?;
        entries.reverse();
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    pub fn forward_stats(&self, scope: &str) -> Result<ForwardStats, StoreError> {
        let mut stats = ForwardStats::default();
        self.backend
            .scan_prefix(&keys::forward_log_prefix(scope), &mut |_key, value| {
                let entry: ForwardLogEntry = serde_json::from_slice(value)?;
                stats.total += 1;
                match entry.outcome {
                    ForwardOutcome::Success => stats.success += 1,
                    ForwardOutcome::Failed => stats.failed += 1,
                    ForwardOutcome::Retry => stats.retry += 1,
                    ForwardOutcome::Skipped => stats.skipped += 1,
                }
                Ok(())
            })?;
        Ok(stats)
    }

    /// Cumulative successful-forward counter for a rule.
    pub fn increment_rule_forward_count(
        &self,
        scope: &str,
        rule_id: u64,
    ) -> Result<u64, StoreError> {
        self.backend.incr(&keys::rule_forward_count(scope, rule_id))
    }

    pub fn rule_forward_count(&self, scope: &str, rule_id: u64) -> Result<u64, StoreError> {
        match self.backend.get(&keys::rule_forward_count(scope, rule_id))? {
            Some(bytes) => backend_u64(&bytes),
            None => Ok(0),
        }
    }

    // ── Duplicate-target safeguard ──────────────────────────────────────

    /// Claim the `(lead, target)` delivery slot for a rule.
    ///
    /// Returns `None` when this rule now owns the slot, or `Some(rule_id)` of
    /// the prior claimant. A rule re-claiming its own slot (a retry of the
    /// same logical delivery) also returns `Some` with its own id — callers
    /// distinguish "mine, retrying" from "someone else already forwarded
    /// here".
    pub fn claim_forward_target(
        &self,
        scope: &str,
        lead_id: u64,
        target_id: &str,
        rule_id: u64,
    ) -> Result<Option<u64>, StoreError> {
        match self.backend.put_if_absent(
            &keys::target_claim(scope, lead_id, target_id),
            &rule_id.to_be_bytes(),
        )? {
            None => Ok(None),
            Some(existing) => Ok(Some(backend_u64(&existing)?)),
        }
    }
}

fn backend_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::backend("expected 8-byte id value"))?;
    Ok(u64::from_be_bytes(arr))
}
