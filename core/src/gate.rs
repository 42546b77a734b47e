//! The authorization gate: one money-movement request, end to end.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Resolve KYC tier   (request, else stored tier, else basic)
//!   2. Limit enforcement  (hard failure stops here, nothing persisted)
//!   3. Fraud scoring      } independent of each other,
//!   4. AML monitoring     } both always run once limits pass
//!   5. Step-up challenge  (only for requests that cleared 3 and 4)
//!
//! RULES:
//!   - Components never call each other; only the gate composes them.
//!   - Soft findings (review decision, non-critical alerts) never block.
//!   - PIN verification is a separate possession check, not part of this flow.

use crate::{
    aml_monitor::{AmlCheck, AmlInput, AmlMonitor},
    clock::Clock,
    config::GateConfig,
    error::{GateError, GateResult},
    event::AuditSink,
    fraud_scoring_engine::{FraudAssessment, FraudDecision, FraudInput, FraudScoringEngine},
    limit_enforcement::{LimitCheck, LimitEnforcer},
    rng::CodeSource,
    step_up_challenge::{requires_step_up, CodeDelivery, IssuedChallenge, StepUpService},
    store::GateStore,
    types::{Amount, EntityId},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ACTION: &str = "transfer";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorizationRequest {
    pub customer_id: EntityId,
    pub amount: Amount,
    #[serde(default)]
    pub transaction_id: Option<EntityId>,
    #[serde(default = "default_txn_type")]
    pub txn_type: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub kyc_tier: Option<String>,
    #[serde(default)]
    pub is_new_payee: bool,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

fn default_txn_type() -> String {
    DEFAULT_ACTION.to_string()
}

impl AuthorizationRequest {
    pub fn transfer(customer_id: impl Into<EntityId>, amount: Amount) -> Self {
        Self {
            customer_id: customer_id.into(),
            amount,
            transaction_id: None,
            txn_type: default_txn_type(),
            action: None,
            kyc_tier: None,
            is_new_payee: false,
            counterparty: None,
            country: None,
            device_id: None,
        }
    }

    pub fn action(&self) -> &str {
        self.action.as_deref().unwrap_or(DEFAULT_ACTION)
    }

    fn fraud_input(&self) -> FraudInput {
        let mut input = FraudInput::new(self.customer_id.clone(), self.amount)
            .with_new_payee(self.is_new_payee);
        if let Some(id) = &self.transaction_id {
            input = input.with_transaction(id.clone());
        }
        if let Some(country) = &self.country {
            input = input.with_country(country.clone());
        }
        if let Some(device) = &self.device_id {
            input = input.with_device(device.clone());
        }
        input
    }

    fn aml_input(&self) -> AmlInput {
        let mut input = AmlInput::new(self.customer_id.clone(), self.amount, self.txn_type.clone());
        if let Some(id) = &self.transaction_id {
            input = input.with_transaction(id.clone());
        }
        if let Some(name) = &self.counterparty {
            input = input.with_counterparty(name.clone());
        }
        input
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    FraudBlock,
    AmlCritical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateDecision {
    RejectedByLimits {
        limits: LimitCheck,
    },
    Blocked {
        reasons: Vec<BlockReason>,
        limits: LimitCheck,
        fraud: FraudAssessment,
        aml: AmlCheck,
    },
    Approved {
        limits: LimitCheck,
        fraud: FraudAssessment,
        aml: AmlCheck,
        needs_review: bool,
        challenge: Option<IssuedChallenge>,
    },
}

impl GateDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    /// The step-up challenge the customer must complete, if any.
    pub fn challenge(&self) -> Option<&IssuedChallenge> {
        match self {
            Self::Approved { challenge, .. } => challenge.as_ref(),
            _ => None,
        }
    }
}

pub struct AuthorizationGate<'a> {
    config: &'a GateConfig,
    store: &'a GateStore,
    clock: &'a dyn Clock,
    codes: &'a dyn CodeSource,
    delivery: &'a dyn CodeDelivery,
    audit: &'a dyn AuditSink,
}

impl<'a> AuthorizationGate<'a> {
    pub fn new(
        config: &'a GateConfig,
        store: &'a GateStore,
        clock: &'a dyn Clock,
        codes: &'a dyn CodeSource,
        delivery: &'a dyn CodeDelivery,
        audit: &'a dyn AuditSink,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            codes,
            delivery,
            audit,
        }
    }

    pub fn authorize(&self, request: &AuthorizationRequest) -> GateResult<GateDecision> {
        if request.customer_id.trim().is_empty() {
            return Err(GateError::validation("customer id is required"));
        }

        // 1. Tier
        let stored_tier;
        let tier = match request.kyc_tier.as_deref() {
            Some(t) => Some(t),
            None => {
                stored_tier = self.store.customer_kyc_tier(&request.customer_id)?;
                stored_tier.as_deref()
            }
        };

        // 2. Limits
        let limits = LimitEnforcer::new(self.store, self.clock).check(
            self.config,
            &request.customer_id,
            request.amount,
            tier,
        )?;
        if !limits.allowed {
            log::info!(
                "gate: customer={} rejected by limits: {}",
                request.customer_id,
                limits.reason.as_deref().unwrap_or("-")
            );
            return Ok(GateDecision::RejectedByLimits { limits });
        }

        // 3 + 4. Fraud and AML
        let fraud = FraudScoringEngine::new(self.store, self.clock, self.audit)
            .score(self.config, &request.fraud_input())?;
        let aml = AmlMonitor::new(self.store, self.clock, self.audit)
            .check(self.config, &request.aml_input())?;

        let mut reasons = Vec::new();
        if fraud.decision == FraudDecision::Block {
            reasons.push(BlockReason::FraudBlock);
        }
        if !aml.passed {
            reasons.push(BlockReason::AmlCritical);
        }
        if !reasons.is_empty() {
            log::warn!(
                "gate: customer={} blocked fraud_score={} aml_alerts={}",
                request.customer_id,
                fraud.score,
                aml.alerts.len()
            );
            return Ok(GateDecision::Blocked {
                reasons,
                limits,
                fraud,
                aml,
            });
        }

        let needs_review = fraud.decision == FraudDecision::Review || !aml.alerts.is_empty();

        // 5. Step-up
        let challenge = if requires_step_up(&self.config.sca, Some(request.amount), Some(request.action())) {
            let metadata = serde_json::json!({
                "amount": request.amount,
                "transaction_id": request.transaction_id,
                "fraud_score_id": fraud.score_id,
            });
            let service = StepUpService::new(self.store, self.clock, self.codes, self.delivery, self.audit);
            Some(service.create(&self.config.sca, &request.customer_id, request.action(), Some(&metadata))?)
        } else {
            None
        };

        log::info!(
            "gate: customer={} approved review={} step_up={}",
            request.customer_id,
            needs_review,
            challenge.is_some()
        );
        Ok(GateDecision::Approved {
            limits,
            fraud,
            aml,
            needs_review,
            challenge,
        })
    }
}
