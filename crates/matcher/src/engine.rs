use ingest::CanonicalLead;

use crate::types::{Criterion, ForwardingRule, MatchedCriteria, RoutingRule, RuleCriteria};

#[cfg(test)]
mod tests;

/// The three lead attributes rule evaluation looks at, borrowed from a
/// canonical lead (or supplied directly in tests).
#[derive(Debug, Clone, Copy)]
pub struct LeadFacts<'a> {
    pub product_type: Option<&'a str>,
    pub zip: Option<&'a str>,
    pub state: Option<&'a str>,
}

impl<'a> LeadFacts<'a> {
    pub fn from_lead(lead: &'a CanonicalLead) -> Self {
        Self {
            product_type: lead.product_type.as_deref(),
            zip: lead.zip.as_deref(),
            state: lead.state.as_deref(),
        }
    }
}

/// Whether a lead satisfies all three criteria dimensions of a rule.
pub fn criteria_match(criteria: &RuleCriteria, facts: LeadFacts<'_>) -> bool {
    criteria.product_types.matches(facts.product_type)
        && criteria.zip_codes.matches(facts.zip)
        && criteria.states.matches(facts.state)
}

/// Evaluate routing rules: first match wins.
///
/// Only `is_active` rules participate, in `(priority asc, id asc)` order —
/// the order is imposed here regardless of input order, so evaluation is
/// deterministic even when priorities collide. Returns `None` when no rule
/// matches (the lead stays unassigned).
pub fn match_routing<'r>(
    rules: &'r [RoutingRule],
    facts: LeadFacts<'_>,
) -> Option<&'r RoutingRule> {
    let mut active: Vec<&RoutingRule> = rules.iter().filter(|r| r.is_active).collect();
    active.sort_by_key(|r| (r.priority, r.id));
    active
        .into_iter()
        .find(|rule| criteria_match(&rule.criteria, facts))
}

/// Evaluate forwarding rules: every active matching rule fires.
///
/// `forward_enabled` is deliberately NOT checked here — a matched-but-disabled
/// rule must reach the dispatcher so it can log a `skipped` attempt instead of
/// silently vanishing. Results keep `(priority asc, id asc)` order.
pub fn match_forwarding<'r>(
    rules: &'r [ForwardingRule],
    facts: LeadFacts<'_>,
) -> Vec<&'r ForwardingRule> {
    let mut active: Vec<&ForwardingRule> = rules.iter().filter(|r| r.is_active).collect();
    active.sort_by_key(|r| (r.priority, r.id));
    active
        .into_iter()
        .filter(|rule| criteria_match(&rule.criteria, facts))
        .collect()
}

/// Echo which lead attribute satisfied each dimension of a matched rule.
///
/// A wildcard dimension matched against an absent attribute echoes `"*"`.
pub fn matched_criteria(criteria: &RuleCriteria, facts: LeadFacts<'_>) -> MatchedCriteria {
    fn echo(criterion: &Criterion, value: Option<&str>) -> String {
        match (criterion, value) {
            (_, Some(v)) => v.to_string(),
            (Criterion::Wildcard, None) => "*".to_string(),
            // Unreachable for a matched rule; kept total for log robustness.
            (Criterion::Exact(_), None) => String::new(),
        }
    }

    MatchedCriteria {
        product_type: echo(&criteria.product_types, facts.product_type),
        zip: echo(&criteria.zip_codes, facts.zip),
        state: echo(&criteria.states, facts.state),
    }
}
