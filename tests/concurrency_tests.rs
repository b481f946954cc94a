//! Concurrency tests for contact identity resolution.
//!
//! The core invariant: at most one contact per `(scope, normalized phone)`
//! regardless of submission order or parallelism.

use std::sync::Arc;
use std::thread;

use leadrelay::{process_lead, ContactStatus, LeadStore, PipelineConfig, RawLeadSubmission};
use serde_json::json;

fn submission(phone: &str, first_name: &str) -> RawLeadSubmission {
    serde_json::from_value(json!({
        "firstName": first_name,
        "lastName": "Lovelace",
        "email": format!("{}@example.com", first_name.to_lowercase()),
        "source": "load-test",
        "phone": phone,
    }))
    .unwrap()
}

#[test]
fn concurrent_same_phone_creates_exactly_one_contact() {
    let store = Arc::new(LeadStore::in_memory());
    let cfg = PipelineConfig::default();

    // Varied formatting of the same number, hammered from many threads.
    let formats = [
        "5551234567",
        "(555) 123-4567",
        "555-123-4567",
        "1-555-123-4567",
        "+1 555 123 4567",
    ];

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let store = Arc::clone(&store);
            let cfg = cfg.clone();
            let phone = formats[i % formats.len()].to_string();
            thread::spawn(move || {
                process_lead(
                    submission(&phone, &format!("Thread{i}")),
                    "wh-conc",
                    &cfg,
                    &store,
                    None,
                )
                .expect("process_lead should succeed")
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let contacts = store.contacts("wh-conc").unwrap();
    assert_eq!(contacts.len(), 1, "dedup race produced extra contacts");

    let contact_id = contacts[0].id;
    for outcome in &outcomes {
        assert_eq!(outcome.contact_id, contact_id);
    }

    // Exactly one submission observed the contact as new.
    let new_count = outcomes
        .iter()
        .filter(|o| o.contact_status == ContactStatus::New)
        .count();
    assert_eq!(new_count, 1);

    // Every submission still produced its own lead under that contact.
    let mut lead_ids: Vec<u64> = outcomes.iter().map(|o| o.lead_id).collect();
    lead_ids.sort_unstable();
    lead_ids.dedup();
    assert_eq!(lead_ids.len(), outcomes.len());
}

#[test]
fn concurrent_distinct_phones_do_not_interfere() {
    let store = Arc::new(LeadStore::in_memory());
    let cfg = PipelineConfig::default();

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let store = Arc::clone(&store);
            let cfg = cfg.clone();
            thread::spawn(move || {
                let phone = format!("55512345{i:02}");
                process_lead(
                    submission(&phone, &format!("User{i}")),
                    "wh-conc",
                    &cfg,
                    &store,
                    None,
                )
                .expect("process_lead should succeed")
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(store.contacts("wh-conc").unwrap().len(), 10);
    for outcome in outcomes {
        assert_eq!(outcome.contact_status, ContactStatus::New);
    }
}

#[test]
fn concurrent_phoneless_submissions_dedupe_by_email() {
    let store = Arc::new(LeadStore::in_memory());
    let cfg = PipelineConfig::default();

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let store = Arc::clone(&store);
            let cfg = cfg.clone();
            thread::spawn(move || {
                let raw: RawLeadSubmission = serde_json::from_value(json!({
                    "firstName": format!("T{i}"),
                    "lastName": "Shared",
                    // Case varies; the dedup key is lowercased.
                    "email": if i % 2 == 0 { "Shared@Example.com" } else { "shared@example.com" },
                    "source": "load-test",
                }))
                .unwrap();
                process_lead(raw, "wh-conc", &cfg, &store, None).unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.contacts("wh-conc").unwrap().len(), 1);
}
