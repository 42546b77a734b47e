//! Audit events: everything the gate reports to the audit-log collaborator.
//!
//! RULE: events carry ids, scores and counts. Never PINs, challenge codes,
//! hashes, or fraud rule parameters.

use crate::{
    error::GateResult,
    types::{Amount, EntityId, Timestamp},
};
use serde::{Deserialize, Serialize};

/// Every auditable outcome produced by the gate.
/// Variants are appended, never reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // ── Fraud ──────────────────────────────────────
    FraudDecisionRecorded {
        score_id: EntityId,
        customer_id: EntityId,
        transaction_id: Option<EntityId>,
        score: u32,
        decision: String,
        factor_count: usize,
    },
    FraudCaseOpened {
        case_id: EntityId,
        customer_id: EntityId,
        priority: String,
        amount_at_risk: Amount,
    },
    FraudScoreReviewed {
        score_id: EntityId,
        reviewer: String,
        outcome: String,
    },
    FraudCaseStatusChanged {
        case_id: EntityId,
        from: String,
        to: String,
    },

    // ── AML ────────────────────────────────────────
    AmlAlertsRaised {
        customer_id: EntityId,
        transaction_id: Option<EntityId>,
        alert_count: usize,
        amount: Amount,
        alert_types: Vec<String>,
        passed: bool,
    },
    AmlAlertStatusChanged {
        alert_id: EntityId,
        from: String,
        to: String,
    },

    // ── Step-up and PIN ────────────────────────────
    ChallengeVerified {
        challenge_id: EntityId,
        customer_id: EntityId,
        action: String,
    },
    ChallengeExhausted {
        challenge_id: EntityId,
        customer_id: EntityId,
    },
    PinSet {
        customer_id: EntityId,
    },
    PinCredentialUpgraded {
        customer_id: EntityId,
        from_version: u8,
        to_version: u8,
    },

    // ── Customer risk ──────────────────────────────
    CustomerRiskRated {
        customer_id: EntityId,
        score: u32,
        tier: String,
    },
}

impl AuditEvent {
    /// Stable name for the event_type column.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::FraudDecisionRecorded { .. }  => "fraud_decision_recorded",
            Self::FraudCaseOpened { .. }        => "fraud_case_opened",
            Self::FraudScoreReviewed { .. }     => "fraud_score_reviewed",
            Self::FraudCaseStatusChanged { .. } => "fraud_case_status_changed",
            Self::AmlAlertsRaised { .. }        => "aml_alerts_raised",
            Self::AmlAlertStatusChanged { .. }  => "aml_alert_status_changed",
            Self::ChallengeVerified { .. }      => "challenge_verified",
            Self::ChallengeExhausted { .. }     => "challenge_exhausted",
            Self::PinSet { .. }                 => "pin_set",
            Self::PinCredentialUpgraded { .. }  => "pin_credential_upgraded",
            Self::CustomerRiskRated { .. }      => "customer_risk_rated",
        }
    }

    /// The entity the event is about.
    pub fn target(&self) -> &str {
        match self {
            Self::FraudDecisionRecorded { customer_id, .. }
            | Self::FraudCaseOpened { customer_id, .. }
            | Self::AmlAlertsRaised { customer_id, .. }
            | Self::PinSet { customer_id }
            | Self::PinCredentialUpgraded { customer_id, .. }
            | Self::CustomerRiskRated { customer_id, .. } => customer_id,
            Self::FraudScoreReviewed { score_id, .. } => score_id,
            Self::FraudCaseStatusChanged { case_id, .. } => case_id,
            Self::AmlAlertStatusChanged { alert_id, .. } => alert_id,
            Self::ChallengeVerified { challenge_id, .. }
            | Self::ChallengeExhausted { challenge_id, .. } => challenge_id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::FraudDecisionRecorded { .. } => "score",
            Self::FraudCaseOpened { .. } => "open_case",
            Self::FraudScoreReviewed { .. } => "review",
            Self::FraudCaseStatusChanged { .. } | Self::AmlAlertStatusChanged { .. } => "transition",
            Self::AmlAlertsRaised { .. } => "alert",
            Self::ChallengeVerified { .. } => "verify",
            Self::ChallengeExhausted { .. } => "lock",
            Self::PinSet { .. } => "set_pin",
            Self::PinCredentialUpgraded { .. } => "rehash",
            Self::CustomerRiskRated { .. } => "rate",
        }
    }

    pub fn into_record(self, actor: &str, at: Timestamp) -> GateResult<AuditRecord> {
        Ok(AuditRecord {
            id: None,
            event_type: self.event_type().to_string(),
            actor: actor.to_string(),
            target: self.target().to_string(),
            action: self.action().to_string(),
            detail: serde_json::to_string(&self)?,
            created_at: at,
        })
    }
}

/// The audit entry as handed to the audit-log collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: Option<i64>,
    pub event_type: String,
    pub actor: String,
    pub target: String,
    pub action: String,
    pub detail: String, // JSON-serialized AuditEvent
    pub created_at: Timestamp,
}

/// The external audit log. The gate emits; it never reads back.
pub trait AuditSink {
    fn emit(&self, record: &AuditRecord) -> GateResult<()>;
}

/// Build and emit an event in one step.
pub fn emit(
    sink: &dyn AuditSink,
    actor: &str,
    at: Timestamp,
    event: AuditEvent,
) -> GateResult<()> {
    let record = event.into_record(actor, at)?;
    log::debug!("audit: {} target={} actor={actor}", record.event_type, record.target);
    sink.emit(&record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_counts_not_factors() {
        let event = AuditEvent::FraudDecisionRecorded {
            score_id: "fs-1".into(),
            customer_id: "c-1".into(),
            transaction_id: None,
            score: 65,
            decision: "block".into(),
            factor_count: 3,
        };
        let record = event.into_record("fraud_scoring_engine", 10).unwrap();
        assert_eq!(record.event_type, "fraud_decision_recorded");
        assert_eq!(record.target, "c-1");
        assert_eq!(record.action, "score");
        assert!(record.detail.contains("\"factor_count\":3"));
    }
}
