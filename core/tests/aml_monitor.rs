//! AML monitoring: statutory checks, persisted alerts, alert lifecycle.

mod common;

use common::*;
use riskgate_core::{
    aml_monitor::{AlertSeverity, AlertStatus, AmlAlertType, AmlInput, AmlMonitor},
    clock::FixedClock,
    config::{AmlConfig, GateConfig},
    error::GateError,
};

#[test]
fn twelve_thousand_raises_high_alert_and_passes() {
    let store = fresh_store();
    seed_customer(&store, "c-1", None);
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let monitor = AmlMonitor::new(&store, &clock, &audit);

    let check = monitor
        .check(&GateConfig::default_test(), &AmlInput::new("c-1", 12_000.0, "transfer"))
        .unwrap();
    assert!(check.passed);
    assert_eq!(check.alerts.len(), 1);
    assert_eq!(check.alerts[0].alert_type, AmlAlertType::LargeTransaction);
    assert_eq!(check.alerts[0].severity, AlertSeverity::High);
    assert_eq!(check.alerts[0].status, AlertStatus::New);

    let stored = store.aml_alerts_for_customer("c-1").unwrap();
    assert_eq!(stored, check.alerts);

    let raised = audit.of_type("aml_alerts_raised");
    assert_eq!(raised.len(), 1);
    assert!(raised[0].detail.contains("\"alert_count\":1"));
    assert!(raised[0].detail.contains("\"passed\":true"));
}

#[test]
fn sixty_thousand_is_critical_and_fails() {
    let store = fresh_store();
    seed_customer(&store, "c-1", None);
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let monitor = AmlMonitor::new(&store, &clock, &audit);

    let check = monitor
        .check(&GateConfig::default_test(), &AmlInput::new("c-1", 60_000.0, "transfer"))
        .unwrap();
    assert!(!check.passed);
    assert_eq!(check.alerts.len(), 1);
    assert_eq!(check.alerts[0].severity, AlertSeverity::Critical);
}

#[test]
fn below_threshold_raises_nothing() {
    let store = fresh_store();
    seed_customer(&store, "c-1", None);
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let monitor = AmlMonitor::new(&store, &clock, &audit);

    let check = monitor
        .check(&GateConfig::default_test(), &AmlInput::new("c-1", 9_999.99, "transfer"))
        .unwrap();
    assert!(check.passed);
    assert!(check.alerts.is_empty());
    assert!(audit.records().is_empty());
    assert!(store.aml_alerts_for_customer("c-1").unwrap().is_empty());
}

#[test]
fn velocity_triggers_above_five_in_the_hour() {
    let store = fresh_store();
    seed_customer(&store, "c-1", None);
    for i in 0..5 {
        seed_debit(&store, "c-1", &format!("t-{i}"), 20.0, T0 - 30 * 60);
    }
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let monitor = AmlMonitor::new(&store, &clock, &audit);
    let config = GateConfig::default_test();

    let five = monitor.check(&config, &AmlInput::new("c-1", 20.0, "transfer")).unwrap();
    assert!(!five.has_alert(AmlAlertType::Velocity));

    seed_debit(&store, "c-1", "t-5", 20.0, T0 - 60);
    let six = monitor.check(&config, &AmlInput::new("c-1", 20.0, "transfer")).unwrap();
    assert!(six.has_alert(AmlAlertType::Velocity));
    assert_eq!(six.alerts[0].severity, AlertSeverity::Medium);
    assert!(six.passed);

    // The request's own transaction is not history.
    let own = monitor
        .check(&config, &AmlInput::new("c-1", 20.0, "transfer").with_transaction("t-5"))
        .unwrap();
    assert!(!own.has_alert(AmlAlertType::Velocity));
}

#[test]
fn structuring_needs_two_similar_priors_in_a_day() {
    let store = fresh_store();
    seed_customer(&store, "c-1", None);
    seed_debit(&store, "c-1", "s-1", 9_000.0, T0 - 5 * HOUR);
    // Outside the 24h window.
    seed_debit(&store, "c-1", "s-old", 9_200.0, T0 - 2 * DAY);
    // Outside the band.
    seed_debit(&store, "c-1", "s-big", 10_000.0, T0 - HOUR);

    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let monitor = AmlMonitor::new(&store, &clock, &audit);
    let config = GateConfig::default_test();

    let one_prior = monitor.check(&config, &AmlInput::new("c-1", 9_500.0, "transfer")).unwrap();
    assert!(!one_prior.has_alert(AmlAlertType::Structuring));

    seed_debit(&store, "c-1", "s-2", 8_000.0, T0 - 2 * HOUR);
    let two_priors = monitor.check(&config, &AmlInput::new("c-1", 9_500.0, "transfer")).unwrap();
    assert!(two_priors.has_alert(AmlAlertType::Structuring));
    let alert = &two_priors.alerts[0];
    assert_eq!(alert.severity, AlertSeverity::High);
    assert!(alert.reason.starts_with("3 transactions"));
    assert!(two_priors.passed);

    // The current amount itself must sit in the band.
    let outside = monitor.check(&config, &AmlInput::new("c-1", 7_999.0, "transfer")).unwrap();
    assert!(!outside.has_alert(AmlAlertType::Structuring));
}

#[test]
fn watchlist_counterparty_is_critical() {
    let store = fresh_store();
    seed_customer(&store, "c-1", None);
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let monitor = AmlMonitor::new(&store, &clock, &audit);
    let config = GateConfig {
        aml: AmlConfig {
            watchlist: vec!["Acme Shell Holdings".into()],
            ..AmlConfig::default()
        },
        ..GateConfig::default_test()
    };

    let check = monitor
        .check(
            &config,
            &AmlInput::new("c-1", 50.0, "payment").with_counterparty("  acme   shell holdings"),
        )
        .unwrap();
    assert!(!check.passed);
    assert!(check.has_alert(AmlAlertType::WatchlistMatch));

    let clean = monitor
        .check(&config, &AmlInput::new("c-1", 50.0, "payment").with_counterparty("Acme Bakery"))
        .unwrap();
    assert!(clean.passed);
    assert!(clean.alerts.is_empty());
}

#[test]
fn checks_are_additive() {
    let store = fresh_store();
    seed_customer(&store, "c-1", None);
    for i in 0..6 {
        seed_debit(&store, "c-1", &format!("t-{i}"), 15.0, T0 - 10 * 60);
    }
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let monitor = AmlMonitor::new(&store, &clock, &audit);

    let check = monitor
        .check(&GateConfig::default_test(), &AmlInput::new("c-1", 55_000.0, "transfer"))
        .unwrap();
    assert_eq!(check.alerts.len(), 2);
    assert!(check.has_alert(AmlAlertType::LargeTransaction));
    assert!(check.has_alert(AmlAlertType::Velocity));
    assert!(!check.passed);
    // One audit event per batch, not per alert.
    assert_eq!(audit.of_type("aml_alerts_raised").len(), 1);
}

#[test]
fn alert_lifecycle() {
    let store = fresh_store();
    seed_customer(&store, "c-1", None);
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let monitor = AmlMonitor::new(&store, &clock, &audit);

    let check = monitor
        .check(&GateConfig::default_test(), &AmlInput::new("c-1", 15_000.0, "transfer"))
        .unwrap();
    let alert_id = &check.alerts[0].alert_id;

    assert!(matches!(
        monitor.transition_alert(alert_id, AlertStatus::Reported, "mlro"),
        Err(GateError::InvalidTransition { .. })
    ));
    monitor
        .transition_alert(alert_id, AlertStatus::Investigating, "analyst-1")
        .unwrap();
    clock.advance(HOUR);
    let reported = monitor
        .transition_alert(alert_id, AlertStatus::Reported, "mlro")
        .unwrap();
    assert_eq!(reported.status, AlertStatus::Reported);
    assert_eq!(reported.updated_at, T0 + HOUR);
    assert_eq!(store.reported_aml_alert_count("c-1").unwrap(), 1);

    assert!(matches!(
        monitor.transition_alert(alert_id, AlertStatus::Dismissed, "mlro"),
        Err(GateError::InvalidTransition { .. })
    ));
    assert!(matches!(
        monitor.transition_alert("aml-missing", AlertStatus::Investigating, "mlro"),
        Err(GateError::NotFound { .. })
    ));
    assert_eq!(audit.of_type("aml_alert_status_changed").len(), 2);
}

#[test]
fn rejects_invalid_amount() {
    let store = fresh_store();
    let clock = FixedClock::at(T0);
    let audit = RecordingAudit::default();
    let monitor = AmlMonitor::new(&store, &clock, &audit);

    assert!(matches!(
        monitor.check(&GateConfig::default_test(), &AmlInput::new("c-1", -1.0, "transfer")),
        Err(GateError::Validation { .. })
    ));
}
