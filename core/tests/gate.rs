//! Authorization gate: end-to-end ordering and outcomes.

mod common;

use common::*;
use riskgate_core::{
    clock::FixedClock,
    config::{AmlConfig, GateConfig},
    fraud_case::CasePriority,
    fraud_scoring_engine::FraudDecision,
    gate::{AuthorizationGate, AuthorizationRequest, BlockReason, GateDecision},
    limit_enforcement::LimitViolation,
    rng::SeededCodeSource,
    step_up_challenge::{ChallengeOutcome, StepUpService},
    store::GateStore,
};

struct Fixture {
    config: GateConfig,
    store: GateStore,
    clock: FixedClock,
    codes: SeededCodeSource,
    delivery: RecordingDelivery,
    audit: RecordingAudit,
}

impl Fixture {
    fn new(config: GateConfig) -> Self {
        Self {
            config,
            store: fresh_store(),
            clock: FixedClock::at(T0),
            codes: SeededCodeSource::new(1),
            delivery: RecordingDelivery::default(),
            audit: RecordingAudit::default(),
        }
    }

    fn gate(&self) -> AuthorizationGate<'_> {
        AuthorizationGate::new(
            &self.config,
            &self.store,
            &self.clock,
            &self.codes,
            &self.delivery,
            &self.audit,
        )
    }
}

#[test]
fn small_transfer_is_approved_without_step_up() {
    let fx = Fixture::new(GateConfig::default_test());
    seed_customer(&fx.store, "c-1", None);

    let decision = fx.gate().authorize(&AuthorizationRequest::transfer("c-1", 20.0)).unwrap();
    match decision {
        GateDecision::Approved { needs_review, challenge, fraud, aml, limits } => {
            assert!(!needs_review);
            assert!(challenge.is_none());
            assert_eq!(fraud.decision, FraudDecision::Allow);
            assert!(aml.passed);
            assert_eq!(limits.kyc_tier, "basic");
        }
        other => panic!("expected approval, got {other:?}"),
    }
    assert_eq!(fx.delivery.delivered(), 0);
}

#[test]
fn over_threshold_transfer_gets_a_challenge() {
    let fx = Fixture::new(GateConfig::default_test());
    seed_customer(&fx.store, "c-1", None);

    let decision = fx.gate().authorize(&AuthorizationRequest::transfer("c-1", 100.0)).unwrap();
    assert!(decision.is_approved());
    let challenge = decision.challenge().unwrap();
    assert_eq!(challenge.expires_at, T0 + 300);
    assert_eq!(fx.delivery.delivered(), 1);

    // The customer completes the step-up out of band.
    let service = StepUpService::new(&fx.store, &fx.clock, &fx.codes, &fx.delivery, &fx.audit);
    let code = fx.delivery.code_for(&challenge.challenge_id);
    assert_eq!(
        service.verify(&challenge.challenge_id, &code).unwrap(),
        ChallengeOutcome::Verified
    );
    assert!(service.confirm(&challenge.challenge_id, "c-1", "transfer").unwrap());
}

#[test]
fn sensitive_action_gets_a_challenge_regardless_of_amount() {
    let fx = Fixture::new(GateConfig::default_test());
    seed_customer(&fx.store, "c-1", None);

    let mut request = AuthorizationRequest::transfer("c-1", 1.0);
    request.action = Some("add_payee".into());
    let decision = fx.gate().authorize(&request).unwrap();
    assert!(decision.challenge().is_some());
}

#[test]
fn limit_rejection_stops_before_scoring() {
    let fx = Fixture::new(GateConfig::default_test());
    seed_customer(&fx.store, "c-1", None);

    let decision = fx.gate().authorize(&AuthorizationRequest::transfer("c-1", 600.0)).unwrap();
    match decision {
        GateDecision::RejectedByLimits { limits } => {
            assert_eq!(limits.violation, Some(LimitViolation::SingleTransaction));
        }
        other => panic!("expected limit rejection, got {other:?}"),
    }
    assert_eq!(fx.store.fraud_score_count("c-1").unwrap(), 0);
    assert!(fx.store.aml_alerts_for_customer("c-1").unwrap().is_empty());
    assert_eq!(fx.delivery.delivered(), 0);
}

#[test]
fn stored_tier_is_used_when_request_has_none() {
    let fx = Fixture::new(GateConfig::default_test());
    seed_customer(&fx.store, "c-1", Some("standard"));

    let decision = fx.gate().authorize(&AuthorizationRequest::transfer("c-1", 600.0)).unwrap();
    assert!(decision.is_approved());

    // An explicit tier on the request takes precedence.
    let mut request = AuthorizationRequest::transfer("c-1", 600.0);
    request.kyc_tier = Some("basic".into());
    let decision = fx.gate().authorize(&request).unwrap();
    assert!(matches!(decision, GateDecision::RejectedByLimits { .. }));
}

#[test]
fn fraud_block_blocks_and_opens_case() {
    let fx = Fixture::new(GateConfig::default_test());
    seed_customer(&fx.store, "c-1", Some("standard"));
    for i in 0..5 {
        seed_debit(&fx.store, "c-1", &format!("t-{i}"), 10.0, T0 - 15 * 60);
    }

    let mut request = AuthorizationRequest::transfer("c-1", 5_000.0);
    request.is_new_payee = true;
    let decision = fx.gate().authorize(&request).unwrap();
    match decision {
        GateDecision::Blocked { reasons, fraud, aml, .. } => {
            assert_eq!(reasons, vec![BlockReason::FraudBlock]);
            // velocity 30 + amount 25 + multiplier 20 + new payee 20
            assert_eq!(fraud.score, 95);
            assert!(aml.passed);
            let case = fx
                .store
                .get_fraud_case(fraud.case_id.as_deref().unwrap())
                .unwrap()
                .unwrap();
            assert_eq!(case.priority, CasePriority::Critical);
        }
        other => panic!("expected block, got {other:?}"),
    }
    assert_eq!(fx.delivery.delivered(), 0);
}

#[test]
fn critical_aml_alert_blocks() {
    let config = GateConfig {
        aml: AmlConfig {
            watchlist: vec!["Night Owl Trading".into()],
            ..AmlConfig::default()
        },
        ..GateConfig::default_test()
    };
    let fx = Fixture::new(config);
    seed_customer(&fx.store, "c-1", None);

    let mut request = AuthorizationRequest::transfer("c-1", 50.0);
    request.counterparty = Some("night owl trading".into());
    let decision = fx.gate().authorize(&request).unwrap();
    match decision {
        GateDecision::Blocked { reasons, fraud, .. } => {
            assert_eq!(reasons, vec![BlockReason::AmlCritical]);
            assert_eq!(fraud.decision, FraudDecision::Allow);
        }
        other => panic!("expected block, got {other:?}"),
    }
    assert_eq!(fx.audit.of_type("aml_alerts_raised").len(), 1);
}

#[test]
fn soft_findings_flag_review_without_blocking() {
    let fx = Fixture::new(GateConfig::default_test());
    seed_customer(&fx.store, "c-1", Some("enhanced"));

    // amount 25 + new payee 20 = 45 (review); 12,000 raises a high AML alert.
    let mut request = AuthorizationRequest::transfer("c-1", 12_000.0);
    request.is_new_payee = true;
    request.transaction_id = Some("t-new".into());
    let decision = fx.gate().authorize(&request).unwrap();
    match &decision {
        GateDecision::Approved { needs_review, fraud, aml, challenge, .. } => {
            assert!(*needs_review);
            assert_eq!(fraud.decision, FraudDecision::Review);
            assert!(aml.passed);
            assert_eq!(aml.alerts.len(), 1);
            assert!(challenge.is_some());
        }
        other => panic!("expected approval, got {other:?}"),
    }

    let json = serde_json::to_value(&decision).unwrap();
    assert_eq!(json["outcome"], "approved");
    assert_eq!(json["needs_review"], true);
}

#[test]
fn request_deserialises_with_defaults() {
    let request: AuthorizationRequest =
        serde_json::from_str(r#"{"customer_id": "c-1", "amount": 42.5}"#).unwrap();
    assert_eq!(request.txn_type, "transfer");
    assert_eq!(request.action(), "transfer");
    assert!(!request.is_new_payee);
    assert!(request.kyc_tier.is_none());
}
