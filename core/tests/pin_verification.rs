//! Transfer PIN: set/verify, malformed input, legacy hash upgrade.

mod common;

use common::*;
use riskgate_core::{
    clock::FixedClock,
    config::GateConfig,
    error::GateError,
    pin_verification::{LegacySha256Hasher, PinHashScheme, PinHasher, PinResponse, PinService},
};

fn scheme() -> PinHashScheme {
    PinHashScheme::from_config(&GateConfig::default_test().pin)
}

#[test]
fn set_then_verify_round_trip() {
    let store = fresh_store();
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let scheme = scheme();
    let pins = PinService::new(&store, &clock, &audit, &scheme);

    pins.set_pin("c-1", "4821").unwrap();
    assert!(pins.verify_pin("c-1", "4821").unwrap());
    assert!(!pins.verify_pin("c-1", "4822").unwrap());

    let stored = store.get_pin_hash("c-1").unwrap().unwrap();
    assert_eq!(stored.len(), 128);
    assert!(!stored.contains("4821"));
    assert_eq!(audit.of_type("pin_set").len(), 1);
}

#[test]
fn set_pin_replaces_previous_pin() {
    let store = fresh_store();
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let scheme = scheme();
    let pins = PinService::new(&store, &clock, &audit, &scheme);

    pins.set_pin("c-1", "1111").unwrap();
    pins.set_pin("c-1", "2222").unwrap();
    assert!(!pins.verify_pin("c-1", "1111").unwrap());
    assert!(pins.verify_pin("c-1", "2222").unwrap());
}

#[test]
fn same_pin_hashes_differently_per_customer() {
    let store = fresh_store();
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let scheme = scheme();
    let pins = PinService::new(&store, &clock, &audit, &scheme);

    pins.set_pin("c-1", "0000").unwrap();
    pins.set_pin("c-2", "0000").unwrap();
    assert_ne!(
        store.get_pin_hash("c-1").unwrap(),
        store.get_pin_hash("c-2").unwrap()
    );
    assert!(pins.verify_pin("c-2", "0000").unwrap());
}

#[test]
fn malformed_pins_are_rejected_before_hashing() {
    let store = fresh_store();
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let scheme = scheme();
    let pins = PinService::new(&store, &clock, &audit, &scheme);

    for bad in ["", "123", "12345", "12a4", "12 4", "１２３４"] {
        assert!(matches!(pins.set_pin("c-1", bad), Err(GateError::Validation { .. })));
        assert!(matches!(pins.verify_pin("c-1", bad), Err(GateError::Validation { .. })));
    }
    assert!(store.get_pin_hash("c-1").unwrap().is_none());
    assert!(audit.records().is_empty());
}

#[test]
fn missing_credential_reports_pin_not_set() {
    let store = fresh_store();
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let scheme = scheme();
    let pins = PinService::new(&store, &clock, &audit, &scheme);

    let result = pins.verify_pin("c-1", "1234");
    assert!(matches!(result, Err(GateError::PinNotSet)));
    let response = PinResponse::from_result(result);
    assert!(!response.verified);
    assert_eq!(response.error.as_deref(), Some("PIN not set"));

    let wrong = PinResponse::from_result(Ok(false));
    assert_eq!(wrong.error.as_deref(), Some("Incorrect PIN"));
}

#[test]
fn legacy_hash_is_accepted_once_then_upgraded() {
    let store = fresh_store();
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let scheme = scheme();
    let pins = PinService::new(&store, &clock, &audit, &scheme);

    let legacy = LegacySha256Hasher.hash("5937", "c-1");
    store.upsert_pin_hash("c-1", &legacy, T0 - 365 * DAY).unwrap();

    clock.advance(60);
    assert!(pins.verify_pin("c-1", "5937").unwrap());

    let upgraded = store.get_pin_hash("c-1").unwrap().unwrap();
    assert_eq!(upgraded.len(), 128);
    assert_eq!(upgraded, scheme.current().hash("5937", "c-1"));

    let events = audit.of_type("pin_credential_upgraded");
    assert_eq!(events.len(), 1);
    assert!(events[0].detail.contains("\"from_version\":1"));
    assert!(events[0].detail.contains("\"to_version\":2"));
    assert!(!events[0].detail.contains(&legacy));

    // Subsequent verifications use the strong hash; no further upgrades.
    assert!(pins.verify_pin("c-1", "5937").unwrap());
    assert_eq!(audit.of_type("pin_credential_upgraded").len(), 1);

    // The old legacy hash is no longer a usable credential.
    assert_ne!(store.get_pin_hash("c-1").unwrap().unwrap(), legacy);
}

#[test]
fn wrong_pin_against_legacy_hash_changes_nothing() {
    let store = fresh_store();
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let scheme = scheme();
    let pins = PinService::new(&store, &clock, &audit, &scheme);

    let legacy = LegacySha256Hasher.hash("5937", "c-1");
    store.upsert_pin_hash("c-1", &legacy, T0).unwrap();

    assert!(!pins.verify_pin("c-1", "5938").unwrap());
    assert_eq!(store.get_pin_hash("c-1").unwrap().unwrap(), legacy);
    assert!(audit.records().is_empty());
}

#[test]
fn unrecognised_hash_length_never_matches() {
    let store = fresh_store();
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let scheme = scheme();
    let pins = PinService::new(&store, &clock, &audit, &scheme);

    store.upsert_pin_hash("c-1", "5937", T0).unwrap();
    assert!(!pins.verify_pin("c-1", "5937").unwrap());
}

#[test]
fn conditional_rewrite_skips_a_changed_credential() {
    let store = fresh_store();
    store.upsert_pin_hash("c-1", "old", T0).unwrap();

    assert!(!store.replace_pin_hash_if("c-1", "stale", "new", T0).unwrap());
    assert_eq!(store.get_pin_hash("c-1").unwrap().as_deref(), Some("old"));
    assert!(store.replace_pin_hash_if("c-1", "old", "new", T0).unwrap());
    assert_eq!(store.get_pin_hash("c-1").unwrap().as_deref(), Some("new"));
}
