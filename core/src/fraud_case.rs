//! Fraud cases and human review.
//!
//! A case is opened by the scoring engine only on a block decision. After
//! that it belongs to investigators:
//!   open → investigating → confirmed_fraud | false_positive → closed
//!
//! Reviewers may also record an outcome against any flagged score.

use crate::{
    clock::Clock,
    error::{GateError, GateResult},
    event::{self, AuditEvent, AuditSink},
    fraud_scoring_engine::FraudDecision,
    store::GateStore,
    types::{Amount, EntityId, Timestamp},
};
use serde::{Deserialize, Serialize};

/// Scores at or above this open a critical case rather than a high one.
pub const CRITICAL_CASE_SCORE: u32 = 80;

const ACTOR: &str = "fraud_case_desk";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CasePriority {
    High,
    Critical,
}

impl CasePriority {
    pub fn from_score(score: u32) -> Self {
        if score >= CRITICAL_CASE_SCORE {
            Self::Critical
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High     => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    Investigating,
    ConfirmedFraud,
    FalsePositive,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open           => "open",
            Self::Investigating  => "investigating",
            Self::ConfirmedFraud => "confirmed_fraud",
            Self::FalsePositive  => "false_positive",
            Self::Closed         => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "investigating" => Some(Self::Investigating),
            "confirmed_fraud" => Some(Self::ConfirmedFraud),
            "false_positive" => Some(Self::FalsePositive),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Investigating)
                | (Self::Investigating, Self::ConfirmedFraud)
                | (Self::Investigating, Self::FalsePositive)
                | (Self::ConfirmedFraud, Self::Closed)
                | (Self::FalsePositive, Self::Closed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudCase {
    pub case_id:          EntityId,
    pub score_id:         EntityId,
    pub customer_id:      EntityId,
    pub transaction_id:   Option<EntityId>,
    pub priority:         CasePriority,
    pub status:           CaseStatus,
    pub amount_at_risk:   Amount,
    pub amount_recovered: Amount,
    pub opened_at:        Timestamp,
    pub updated_at:       Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// The flagged request was legitimate.
    Approved,
    /// The reviewer agreed with the flag.
    Rejected,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

pub struct FraudCaseDesk<'a> {
    store: &'a GateStore,
    clock: &'a dyn Clock,
    audit: &'a dyn AuditSink,
}

impl<'a> FraudCaseDesk<'a> {
    pub fn new(store: &'a GateStore, clock: &'a dyn Clock, audit: &'a dyn AuditSink) -> Self {
        Self { store, clock, audit }
    }

    /// Record a reviewer's verdict on a flagged score. Scores are reviewed once.
    pub fn review_score(
        &self,
        score_id: &str,
        reviewer: &str,
        outcome: ReviewOutcome,
    ) -> GateResult<()> {
        if reviewer.trim().is_empty() {
            return Err(GateError::validation("reviewer is required"));
        }
        let record = self
            .store
            .get_fraud_score(score_id)?
            .ok_or(GateError::NotFound { entity: "Fraud score" })?;
        if record.decision == FraudDecision::Allow {
            return Err(GateError::validation("allowed requests are not reviewed"));
        }
        if let Some(previous) = record.review_outcome {
            return Err(GateError::InvalidTransition {
                entity: "fraud score review",
                from: previous,
                to: outcome.as_str().to_string(),
            });
        }

        let now = self.clock.now_ts();
        if !self
            .store
            .record_fraud_review(score_id, reviewer, outcome.as_str(), now)?
        {
            return Err(GateError::InvalidTransition {
                entity: "fraud score review",
                from: "reviewed".into(),
                to: outcome.as_str().to_string(),
            });
        }
        event::emit(
            self.audit,
            reviewer,
            now,
            AuditEvent::FraudScoreReviewed {
                score_id: score_id.to_string(),
                reviewer: reviewer.to_string(),
                outcome: outcome.as_str().to_string(),
            },
        )
    }

    /// Move a case along its lifecycle. `amount_recovered` may be set when
    /// the case is confirmed or closed.
    pub fn transition_case(
        &self,
        case_id: &str,
        next: CaseStatus,
        amount_recovered: Option<Amount>,
    ) -> GateResult<FraudCase> {
        let mut case = self
            .store
            .get_fraud_case(case_id)?
            .ok_or(GateError::NotFound { entity: "Fraud case" })?;

        if !case.status.can_transition_to(next) {
            return Err(GateError::InvalidTransition {
                entity: "fraud case",
                from: case.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        if let Some(recovered) = amount_recovered {
            if !recovered.is_finite() || recovered < 0.0 || recovered > case.amount_at_risk {
                return Err(GateError::validation(format!(
                    "amount recovered must be between 0 and {:.2}",
                    case.amount_at_risk
                )));
            }
            case.amount_recovered = recovered;
        }

        let previous = case.status;
        case.status = next;
        case.updated_at = self.clock.now_ts();
        self.store.update_fraud_case(&case, previous)?;

        event::emit(
            self.audit,
            ACTOR,
            case.updated_at,
            AuditEvent::FraudCaseStatusChanged {
                case_id: case.case_id.clone(),
                from: previous.as_str().to_string(),
                to: next.as_str().to_string(),
            },
        )?;
        log::info!(
            "fraud case {}: {} -> {}",
            case.case_id,
            previous.as_str(),
            next.as_str()
        );
        Ok(case)
    }
}
