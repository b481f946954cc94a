//! # Lead Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` holds the rule model and the pure evaluation engine that decides
//! where a lead goes. It sits between ingestion (which produces a
//! [`CanonicalLead`](ingest::CanonicalLead)) and the store/dispatcher:
//!
//! - **Routing rules** assign a lead to exactly one internal workspace —
//!   evaluation stops at the first match.
//! - **Forwarding rules** send a lead to external webhooks — every active
//!   matching rule fires independently.
//!
//! The asymmetry is the point: routing answers "where does this lead live",
//! forwarding answers "who else should be told".
//!
//! ## Determinism
//!
//! Within one scope, rules are totally ordered by `(priority asc, id asc)`.
//! The engine imposes that order itself, so repeated evaluation over the same
//! snapshot always yields the same matches in the same order — priority
//! collisions are legal and tie-broken by id, never rejected.
//!
//! ## Evaluation semantics
//!
//! A rule matches a lead iff every criteria dimension accepts the lead's
//! corresponding attribute: the dimension is [`Criterion::Wildcard`], or the
//! attribute is present in the exact set. Empty exact sets match nothing
//! (wildcard is explicit opt-in); comparisons are case-sensitive for product
//! type, 5-digit for zip, uppercase 2-letter for state.
//!
//! ## Example
//!
//! ```
//! use lead_matcher::{match_routing, Criterion, LeadFacts, RoutingRule, RuleCriteria};
//! use chrono::Utc;
//!
//! let rule = RoutingRule {
//!     id: 1,
//!     scope: "wh-1".into(),
//!     name: "solar-leads".into(),
//!     criteria: RuleCriteria {
//!         product_types: Criterion::exact(["Solar"]),
//!         zip_codes: Criterion::Wildcard,
//!         states: Criterion::Wildcard,
//!     },
//!     priority: 1,
//!     is_active: true,
//!     workspace_id: "ws-solar".into(),
//!     created_at: Utc::now(),
//! };
//!
//! let facts = LeadFacts {
//!     product_type: Some("Solar"),
//!     zip: Some("90210"),
//!     state: Some("CA"),
//! };
//! assert_eq!(match_routing(std::slice::from_ref(&rule), facts).unwrap().id, 1);
//! ```

mod engine;
mod types;

pub use crate::engine::{
    criteria_match, match_forwarding, match_routing, matched_criteria, LeadFacts,
};
pub use crate::types::{
    Criterion, ForwardTarget, ForwardingRule, MatchedCriteria, RoutingRule, RuleCriteria,
    RuleError,
};
