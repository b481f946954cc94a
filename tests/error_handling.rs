use leadrelay::{
    process_lead, Criterion, ForwardTarget, ForwardingRule, IngestError, InvalidPhonePolicy,
    LeadStore, PipelineConfig, PipelineError, RawLeadSubmission, RuleCriteria, RuleError,
    StoreError,
};
use serde_json::json;

fn submission(body: serde_json::Value) -> RawLeadSubmission {
    serde_json::from_value(body).expect("valid submission json")
}

fn base() -> serde_json::Value {
    json!({
        "firstName": "Ada",
        "lastName": "Lovelace",
        "email": "ada@example.com",
        "source": "google-ads",
    })
}

#[test]
fn missing_required_field_rejects_and_persists_nothing() {
    let store = LeadStore::in_memory();
    let mut body = base();
    body["email"] = json!("");

    let result = process_lead(
        submission(body),
        "wh-err",
        &PipelineConfig::default(),
        &store,
        None,
    );
    assert!(matches!(
        result,
        Err(PipelineError::Ingest(IngestError::MissingField("email")))
    ));
    assert!(store.contacts("wh-err").unwrap().is_empty());
}

#[test]
fn malformed_phone_rejected_before_resolver() {
    let store = LeadStore::in_memory();
    let mut body = base();
    body["phone"] = json!("555-12");

    let result = process_lead(
        submission(body),
        "wh-err",
        &PipelineConfig::default(),
        &store,
        None,
    );
    assert!(matches!(
        result,
        Err(PipelineError::Ingest(IngestError::InvalidPhone(_)))
    ));
    assert!(store.contacts("wh-err").unwrap().is_empty());
}

#[test]
fn accept_without_dedup_policy_never_merges() {
    let store = LeadStore::in_memory();
    let cfg = PipelineConfig {
        ingest: leadrelay::IngestConfig::default()
            .with_invalid_phone_policy(InvalidPhonePolicy::AcceptWithoutDedup),
    };

    let mut body = base();
    body["phone"] = json!("not-a-phone");

    let first = process_lead(submission(body.clone()), "wh-err", &cfg, &store, None).unwrap();
    let second = process_lead(submission(body), "wh-err", &cfg, &store, None).unwrap();

    // Unparseable identity: each submission gets its own contact.
    assert_ne!(first.contact_id, second.contact_id);
    assert_eq!(store.contacts("wh-err").unwrap().len(), 2);
}

#[test]
fn malformed_zip_and_state_rejected() {
    let store = LeadStore::in_memory();

    let mut body = base();
    body["zipCode"] = json!("9021");
    let result = process_lead(
        submission(body),
        "wh-err",
        &PipelineConfig::default(),
        &store,
        None,
    );
    assert!(matches!(
        result,
        Err(PipelineError::Ingest(IngestError::InvalidZip(_)))
    ));

    let mut body = base();
    body["state"] = json!("California");
    let result = process_lead(
        submission(body),
        "wh-err",
        &PipelineConfig::default(),
        &store,
        None,
    );
    assert!(matches!(
        result,
        Err(PipelineError::Ingest(IngestError::InvalidState(_)))
    ));
}

#[test]
fn rule_validation_rejects_bad_configuration_with_descriptive_errors() {
    let mut rule = ForwardingRule {
        id: 0,
        scope: "wh-err".into(),
        name: "bad".into(),
        criteria: RuleCriteria {
            product_types: Criterion::Wildcard,
            zip_codes: Criterion::exact(Vec::<String>::new()),
            states: Criterion::Wildcard,
        },
        priority: 1,
        is_active: true,
        forward_enabled: true,
        target: ForwardTarget {
            id: "t".into(),
            url: "https://example.com/hook".into(),
        },
        created_at: chrono::Utc::now(),
    };

    // Empty criteria dimension: wildcard must be explicit.
    let err = rule.validate().unwrap_err();
    assert_eq!(err, RuleError::EmptyCriteria("zip_codes"));
    assert!(err.to_string().contains("zip_codes"));

    // Bad target URL.
    rule.criteria.zip_codes = Criterion::Wildcard;
    rule.target.url = "ftp://example.com".into();
    assert!(matches!(rule.validate().unwrap_err(), RuleError::InvalidUrl(_)));

    // Zero priority.
    rule.target.url = "https://example.com/hook".into();
    rule.priority = 0;
    assert_eq!(rule.validate().unwrap_err(), RuleError::InvalidPriority);
}

#[test]
fn missing_lead_is_a_late_error_not_a_crash() {
    let store = LeadStore::in_memory();
    let err = store.set_lead_workspace(424242, "ws-1").unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "lead", .. }));
}
