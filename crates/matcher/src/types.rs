use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One criteria dimension of a rule: either an explicit set of accepted
/// values or the wildcard.
///
/// The wire format keeps the upstream `["*"]` sentinel (any list containing
/// `"*"` deserializes to `Wildcard`), but engine code only ever sees the
/// tagged variant — no magic-string checks outside this module.
///
/// An **empty** exact set matches nothing. That is intentional: wildcard
/// behavior is an explicit opt-in, never the accident of leaving a dimension
/// unconfigured. Rule validation rejects empty sets at creation time; the
/// engine semantics exist so pre-validation data stays inert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    /// Matches any value, including an absent one.
    Wildcard,
    /// Matches values present in the set (exact string comparison).
    Exact(BTreeSet<String>),
}

impl Criterion {
    pub fn wildcard() -> Self {
        Criterion::Wildcard
    }

    pub fn exact<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Criterion::Exact(values.into_iter().map(Into::into).collect())
    }

    fn from_values(values: Vec<String>) -> Self {
        if values.iter().any(|v| v == "*") {
            Criterion::Wildcard
        } else {
            Criterion::Exact(values.into_iter().collect())
        }
    }

    /// Whether a lead attribute satisfies this dimension.
    ///
    /// `value` is `None` when the lead did not supply the attribute; only the
    /// wildcard accepts that.
    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Criterion::Wildcard => true,
            Criterion::Exact(set) => match value {
                Some(v) => set.contains(v),
                None => false,
            },
        }
    }

    pub fn is_empty_exact(&self) -> bool {
        matches!(self, Criterion::Exact(set) if set.is_empty())
    }
}

impl Serialize for Criterion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Criterion::Wildcard => vec!["*".to_string()].serialize(serializer),
            Criterion::Exact(set) => set.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Criterion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<String>::deserialize(deserializer)?;
        Ok(Criterion::from_values(values))
    }
}

/// The shared criteria shape of routing and forwarding rules.
///
/// Comparison forms: product types are case-sensitive as configured, zip
/// codes are stored as 5-digit prefixes, states as uppercase 2-letter codes.
/// [`RuleCriteria::validate`] normalizes zip/state entries into those forms
/// so evaluation is a plain set lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleCriteria {
    pub product_types: Criterion,
    pub zip_codes: Criterion,
    pub states: Criterion,
}

impl RuleCriteria {
    /// A criteria set matching every lead.
    pub fn any() -> Self {
        Self {
            product_types: Criterion::Wildcard,
            zip_codes: Criterion::Wildcard,
            states: Criterion::Wildcard,
        }
    }

    /// Validate and normalize all three dimensions.
    ///
    /// Rejects empty exact sets (each dimension must be explicitly configured
    /// — wildcard is an opt-in), malformed zip codes, and malformed state
    /// codes. Zip entries are reduced to their 5-digit comparison form and
    /// states uppercased in place.
    pub fn validate(&mut self) -> Result<(), RuleError> {
        for (name, criterion) in [
            ("product_types", &self.product_types),
            ("zip_codes", &self.zip_codes),
            ("states", &self.states),
        ] {
            if criterion.is_empty_exact() {
                return Err(RuleError::EmptyCriteria(name));
            }
        }

        if let Criterion::Exact(zips) = &self.zip_codes {
            let mut normalized = BTreeSet::new();
            for zip in zips {
                normalized.insert(
                    phone::normalize_zip(zip).map_err(|_| RuleError::InvalidZip(zip.clone()))?,
                );
            }
            self.zip_codes = Criterion::Exact(normalized);
        }

        if let Criterion::Exact(states) = &self.states {
            let mut normalized = BTreeSet::new();
            for state in states {
                normalized.insert(
                    phone::normalize_state(state)
                        .map_err(|_| RuleError::InvalidState(state.clone()))?,
                );
            }
            self.states = Criterion::Exact(normalized);
        }

        Ok(())
    }
}

/// Destination of a forwarding rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardTarget {
    /// Opaque identifier for the downstream consumer; also the key of the
    /// per-lead duplicate-delivery safeguard.
    pub id: String,
    pub url: String,
}

impl ForwardTarget {
    fn validate(&self) -> Result<(), RuleError> {
        if self.id.trim().is_empty() {
            return Err(RuleError::InvalidTarget("target id must not be empty".into()));
        }
        validate_url(&self.url)
    }
}

/// Routing rule: assigns a matching lead to exactly one internal workspace.
/// First match wins in `(priority asc, id asc)` order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingRule {
    /// Assigned by the store on creation; 0 means not yet persisted.
    #[serde(default)]
    pub id: u64,
    pub scope: String,
    pub name: String,
    pub criteria: RuleCriteria,
    pub priority: u32,
    pub is_active: bool,
    pub workspace_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl RoutingRule {
    pub fn validate(&mut self) -> Result<(), RuleError> {
        validate_common(&self.scope, self.priority)?;
        if self.workspace_id.trim().is_empty() {
            return Err(RuleError::InvalidTarget("workspace_id must not be empty".into()));
        }
        self.criteria.validate()
    }
}

/// Forwarding rule: sends a matching lead to an external webhook. All active
/// matching rules fire independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardingRule {
    #[serde(default)]
    pub id: u64,
    pub scope: String,
    pub name: String,
    pub criteria: RuleCriteria,
    pub priority: u32,
    /// Whether the rule participates in evaluation at all.
    pub is_active: bool,
    /// Whether a matched rule actually dispatches. An active-but-disabled
    /// rule is a staged rollout: it matches and logs `skipped` instead of
    /// delivering.
    pub forward_enabled: bool,
    pub target: ForwardTarget,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ForwardingRule {
    pub fn validate(&mut self) -> Result<(), RuleError> {
        validate_common(&self.scope, self.priority)?;
        self.target.validate()?;
        self.criteria.validate()
    }
}

/// Echo of which lead attribute satisfied each criteria dimension, embedded
/// in forwarding log entries and outbound payloads. A dimension satisfied by
/// wildcard against an absent attribute echoes `"*"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchedCriteria {
    pub product_type: String,
    pub zip: String,
    pub state: String,
}

/// Rule configuration errors, rejected synchronously at creation time.
///
/// Priority collisions are deliberately absent: colliding priorities are
/// legal and resolved by the deterministic `(priority, id)` order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RuleError {
    #[error("rule priority must be >= 1")]
    InvalidPriority,

    #[error("rule scope must not be empty")]
    InvalidScope,

    #[error("criteria dimension {0} is empty; use [\"*\"] to match any value")]
    EmptyCriteria(&'static str),

    #[error("invalid zip code in criteria: {0:?}")]
    InvalidZip(String),

    #[error("invalid state code in criteria: {0:?}")]
    InvalidState(String),

    #[error("invalid target url: {0}")]
    InvalidUrl(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

fn validate_common(scope: &str, priority: u32) -> Result<(), RuleError> {
    if scope.trim().is_empty() {
        return Err(RuleError::InvalidScope);
    }
    if priority == 0 {
        return Err(RuleError::InvalidPriority);
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), RuleError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| RuleError::InvalidUrl(format!("{url:?} must be http(s)")))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() {
        return Err(RuleError::InvalidUrl(format!("{url:?} has no host")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_round_trips_as_star_list() {
        let c = Criterion::Wildcard;
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json, json!(["*"]));
        let back: Criterion = serde_json::from_value(json).unwrap();
        assert_eq!(back, Criterion::Wildcard);
    }

    #[test]
    fn star_anywhere_in_list_means_wildcard() {
        let c: Criterion = serde_json::from_value(json!(["90210", "*"])).unwrap();
        assert_eq!(c, Criterion::Wildcard);
    }

    #[test]
    fn exact_set_round_trips_sorted() {
        let c = Criterion::exact(["Solar", "Roofing"]);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json, json!(["Roofing", "Solar"]));
    }

    #[test]
    fn empty_set_matches_nothing_wildcard_matches_absent() {
        let empty = Criterion::exact(Vec::<String>::new());
        assert!(!empty.matches(Some("90210")));
        assert!(!empty.matches(None));
        assert!(Criterion::Wildcard.matches(None));
    }

    #[test]
    fn empty_criteria_rejected_at_validation() {
        let mut criteria = RuleCriteria {
            product_types: Criterion::Wildcard,
            zip_codes: Criterion::exact(Vec::<String>::new()),
            states: Criterion::Wildcard,
        };
        assert_eq!(
            criteria.validate().unwrap_err(),
            RuleError::EmptyCriteria("zip_codes")
        );
    }

    #[test]
    fn criteria_validation_normalizes_zip_and_state() {
        let mut criteria = RuleCriteria {
            product_types: Criterion::Wildcard,
            zip_codes: Criterion::exact(["90210-1234"]),
            states: Criterion::exact(["ca", "tx"]),
        };
        criteria.validate().unwrap();
        assert_eq!(criteria.zip_codes, Criterion::exact(["90210"]));
        assert_eq!(criteria.states, Criterion::exact(["CA", "TX"]));
    }

    #[test]
    fn bad_urls_rejected() {
        for url in ["ftp://example.com", "example.com/hook", "https://", "http://"] {
            assert!(
                matches!(validate_url(url), Err(RuleError::InvalidUrl(_))),
                "{url:?}"
            );
        }
        validate_url("https://example.com/hooks/1?x=1").unwrap();
    }

    #[test]
    fn zero_priority_rejected_collisions_allowed() {
        let mut rule = RoutingRule {
            id: 0,
            scope: "wh-1".into(),
            name: "r".into(),
            criteria: RuleCriteria::any(),
            priority: 0,
            is_active: true,
            workspace_id: "ws-1".into(),
            created_at: Utc::now(),
        };
        assert_eq!(rule.validate().unwrap_err(), RuleError::InvalidPriority);

        rule.priority = 1;
        rule.validate().unwrap();
        // A second rule with the same priority validates fine.
        let mut twin = rule.clone();
        twin.validate().unwrap();
    }
}
