use super::*;
use crate::types::{Criterion, ForwardTarget, RuleCriteria};
use chrono::Utc;

fn facts<'a>(
    product_type: Option<&'a str>,
    zip: Option<&'a str>,
    state: Option<&'a str>,
) -> LeadFacts<'a> {
    LeadFacts {
        product_type,
        zip,
        state,
    }
}

fn routing_rule(id: u64, priority: u32, criteria: RuleCriteria) -> RoutingRule {
    RoutingRule {
        id,
        scope: "wh-1".into(),
        name: format!("route-{id}"),
        criteria,
        priority,
        is_active: true,
        workspace_id: format!("ws-{id}"),
        created_at: Utc::now(),
    }
}

fn forwarding_rule(id: u64, priority: u32, criteria: RuleCriteria) -> ForwardingRule {
    ForwardingRule {
        id,
        scope: "wh-1".into(),
        name: format!("fwd-{id}"),
        criteria,
        priority,
        is_active: true,
        forward_enabled: true,
        target: ForwardTarget {
            id: format!("target-{id}"),
            url: format!("https://example.com/hooks/{id}"),
        },
        created_at: Utc::now(),
    }
}

fn criteria(products: Criterion, zips: Criterion, states: Criterion) -> RuleCriteria {
    RuleCriteria {
        product_types: products,
        zip_codes: zips,
        states,
    }
}

#[test]
fn all_wildcard_criteria_match_anything() {
    let c = RuleCriteria::any();
    assert!(criteria_match(&c, facts(None, None, None)));
    assert!(criteria_match(&c, facts(Some("Solar"), Some("90210"), Some("CA"))));
}

#[test]
fn exact_dimension_fails_on_absent_attribute() {
    let c = criteria(
        Criterion::Wildcard,
        Criterion::exact(["90210"]),
        Criterion::Wildcard,
    );
    assert!(!criteria_match(&c, facts(Some("Solar"), None, None)));
    assert!(criteria_match(&c, facts(Some("Solar"), Some("90210"), None)));
}

#[test]
fn product_type_comparison_is_case_sensitive() {
    let c = criteria(
        Criterion::exact(["Solar"]),
        Criterion::Wildcard,
        Criterion::Wildcard,
    );
    assert!(criteria_match(&c, facts(Some("Solar"), None, None)));
    assert!(!criteria_match(&c, facts(Some("solar"), None, None)));
}

#[test]
fn spec_scenario_zip_mismatch_falls_through_to_wildcard_rule() {
    // Lead: zip 90210, product Solar. Rule 1 (priority 1) wants zip 90211;
    // rule 2 (priority 2) takes any zip but only Solar. Rule 2 must win.
    let rules = vec![
        routing_rule(
            1,
            1,
            criteria(Criterion::Wildcard, Criterion::exact(["90211"]), Criterion::Wildcard),
        ),
        routing_rule(
            2,
            2,
            criteria(Criterion::exact(["Solar"]), Criterion::Wildcard, Criterion::Wildcard),
        ),
    ];

    let hit = match_routing(&rules, facts(Some("Solar"), Some("90210"), None)).unwrap();
    assert_eq!(hit.id, 2);
    assert_eq!(hit.workspace_id, "ws-2");
}

#[test]
fn routing_stops_at_first_match() {
    let rules = vec![
        routing_rule(1, 1, RuleCriteria::any()),
        routing_rule(2, 2, RuleCriteria::any()),
    ];
    let hit = match_routing(&rules, facts(None, None, None)).unwrap();
    assert_eq!(hit.id, 1);
}

#[test]
fn routing_returns_none_when_nothing_matches() {
    let rules = vec![routing_rule(
        1,
        1,
        criteria(Criterion::exact(["Roofing"]), Criterion::Wildcard, Criterion::Wildcard),
    )];
    assert!(match_routing(&rules, facts(Some("Solar"), None, None)).is_none());
}

#[test]
fn inactive_rules_never_evaluated() {
    let mut rule = routing_rule(1, 1, RuleCriteria::any());
    rule.is_active = false;
    assert!(match_routing(&[rule], facts(None, None, None)).is_none());
}

#[test]
fn priority_collision_breaks_tie_by_id() {
    // Insert out of order to prove the engine imposes the order itself.
    let rules = vec![
        routing_rule(7, 3, RuleCriteria::any()),
        routing_rule(4, 3, RuleCriteria::any()),
    ];
    let hit = match_routing(&rules, facts(None, None, None)).unwrap();
    assert_eq!(hit.id, 4);
}

#[test]
fn forwarding_fires_all_matches_in_order() {
    let rules = vec![
        forwarding_rule(3, 2, RuleCriteria::any()),
        forwarding_rule(
            1,
            1,
            criteria(Criterion::exact(["Solar"]), Criterion::Wildcard, Criterion::Wildcard),
        ),
        forwarding_rule(
            2,
            1,
            criteria(Criterion::Wildcard, Criterion::exact(["10001"]), Criterion::Wildcard),
        ),
    ];

    let hits = match_forwarding(&rules, facts(Some("Solar"), Some("90210"), Some("CA")));
    let ids: Vec<u64> = hits.iter().map(|r| r.id).collect();
    // Rule 2 fails on zip; 1 and 3 fire, ordered by (priority, id).
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn forwarding_includes_disabled_rules_for_skip_logging() {
    let mut rule = forwarding_rule(1, 1, RuleCriteria::any());
    rule.forward_enabled = false;
    let hits = match_forwarding(std::slice::from_ref(&rule), facts(None, None, None));
    assert_eq!(hits.len(), 1);
    assert!(!hits[0].forward_enabled);
}

#[test]
fn evaluation_is_deterministic_across_repeats() {
    let rules = vec![
        forwarding_rule(5, 2, RuleCriteria::any()),
        forwarding_rule(2, 1, RuleCriteria::any()),
        forwarding_rule(9, 1, RuleCriteria::any()),
    ];
    let f = facts(Some("Solar"), Some("90210"), Some("CA"));

    let first: Vec<u64> = match_forwarding(&rules, f).iter().map(|r| r.id).collect();
    for _ in 0..50 {
        let again: Vec<u64> = match_forwarding(&rules, f).iter().map(|r| r.id).collect();
        assert_eq!(first, again);
    }
    assert_eq!(first, vec![2, 9, 5]);
}

#[test]
fn matched_criteria_echoes_lead_values_and_wildcards() {
    let c = criteria(
        Criterion::exact(["Solar"]),
        Criterion::Wildcard,
        Criterion::Wildcard,
    );
    let matched = matched_criteria(&c, facts(Some("Solar"), Some("90210"), None));
    assert_eq!(matched.product_type, "Solar");
    assert_eq!(matched.zip, "90210");
    assert_eq!(matched.state, "*");
}
