//! Fraud Scoring Engine.
//!
//! Scores one money-movement request against the active fraud rules:
//!   1. Evaluates every active rule (velocity, amount, behavioural,
//!      time-of-day, geographic, device) and collects triggered factors
//!   2. Sums rule weights, clamped to [0, 100]
//!   3. Maps the score to allow / review / block
//!   4. Persists the score; opens a fraud case on block
//!   5. Audits every non-allow decision (score, decision, factor count only)

use crate::{
    clock::Clock,
    config::{FraudCondition, FraudRule, GateConfig, MissingConfigPolicy},
    error::{GateError, GateResult},
    event::{self, AuditEvent, AuditSink},
    fraud_case::{CasePriority, CaseStatus, FraudCase},
    store::GateStore,
    types::{validate_amount, Amount, EntityId},
};
use chrono::Timelike;
use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_SCORE: u32 = 100;
pub const BLOCK_THRESHOLD: u32 = 61;
pub const REVIEW_THRESHOLD: u32 = 31;

const ACTOR: &str = "fraud_scoring_engine";

// ── Data Structures ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FraudDecision {
    Allow,
    Review,
    Block,
}

impl FraudDecision {
    pub fn from_score(score: u32) -> Self {
        if score >= BLOCK_THRESHOLD {
            Self::Block
        } else if score >= REVIEW_THRESHOLD {
            Self::Review
        } else {
            Self::Allow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Review => "review",
            Self::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "review" => Some(Self::Review),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

/// One triggered rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudFactor {
    pub rule: String,
    pub points: u32,
    pub description: String,
}

/// The request being scored.
#[derive(Debug, Clone, Default)]
pub struct FraudInput {
    pub customer_id: EntityId,
    pub amount: Amount,
    pub transaction_id: Option<EntityId>,
    pub is_new_payee: bool,
    /// ISO country code the request originates from.
    pub country: Option<String>,
    pub device_id: Option<String>,
}

impl FraudInput {
    pub fn new(customer_id: impl Into<EntityId>, amount: Amount) -> Self {
        Self {
            customer_id: customer_id.into(),
            amount,
            ..Self::default()
        }
    }

    pub fn with_transaction(mut self, transaction_id: impl Into<EntityId>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_new_payee(mut self, is_new_payee: bool) -> Self {
        self.is_new_payee = is_new_payee;
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// What the caller gets back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudAssessment {
    pub score_id: EntityId,
    pub score: u32,
    pub decision: FraudDecision,
    pub factors: Vec<FraudFactor>,
    pub case_id: Option<EntityId>,
}

/// The persisted score, including reviewer fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudScoreRecord {
    pub score_id:       EntityId,
    pub customer_id:    EntityId,
    pub transaction_id: Option<EntityId>,
    pub amount:         Amount,
    pub score:          u32,
    pub decision:       FraudDecision,
    pub factors:        Vec<FraudFactor>,
    pub review_outcome: Option<String>,
    pub reviewed_by:    Option<String>,
    pub reviewed_at:    Option<i64>,
    pub created_at:     i64,
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct FraudScoringEngine<'a> {
    store: &'a GateStore,
    clock: &'a dyn Clock,
    audit: &'a dyn AuditSink,
}

impl<'a> FraudScoringEngine<'a> {
    pub fn new(store: &'a GateStore, clock: &'a dyn Clock, audit: &'a dyn AuditSink) -> Self {
        Self { store, clock, audit }
    }

    /// Score a request, persist the result, and open a case on block.
    pub fn score(&self, config: &GateConfig, input: &FraudInput) -> GateResult<FraudAssessment> {
        if input.customer_id.trim().is_empty() {
            return Err(GateError::validation("customer id is required"));
        }
        validate_amount(input.amount)?;

        let rules: Vec<&FraudRule> = config.active_fraud_rules().collect();
        let mut factors = Vec::new();
        let mut forced_review = false;

        if rules.is_empty() {
            match config.missing_config_policy {
                MissingConfigPolicy::FailOpen => {
                    log::warn!("fraud: no active rules configured, allowing by default");
                }
                MissingConfigPolicy::FailClosed => {
                    log::warn!("fraud: no active rules configured, forcing review");
                    forced_review = true;
                    factors.push(FraudFactor {
                        rule: "no_rules_configured".into(),
                        points: 0,
                        description: "No active fraud rules are configured".into(),
                    });
                }
            }
        }

        for rule in rules {
            if let Some(factor) = self.evaluate_rule(rule, input)? {
                factors.push(factor);
            }
        }

        let score = total_score(&factors);
        let decision = if forced_review {
            FraudDecision::Review
        } else {
            FraudDecision::from_score(score)
        };

        let now = self.clock.now_ts();
        let record = FraudScoreRecord {
            score_id: format!("fs-{}", uuid::Uuid::new_v4()),
            customer_id: input.customer_id.clone(),
            transaction_id: input.transaction_id.clone(),
            amount: input.amount,
            score,
            decision,
            factors,
            review_outcome: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
        };
        // Score, case and audit rows land together or not at all.
        let case_id = self.store.atomically(|| self.persist(&record))?;

        if decision != FraudDecision::Allow {
            log::info!(
                "fraud: customer={} score={} decision={} factors={}",
                record.customer_id,
                score,
                decision.as_str(),
                record.factors.len()
            );
        }

        Ok(FraudAssessment {
            score_id: record.score_id,
            score,
            decision,
            factors: record.factors,
            case_id,
        })
    }

    fn persist(&self, record: &FraudScoreRecord) -> GateResult<Option<EntityId>> {
        self.store.insert_fraud_score(record)?;

        let case_id = if record.decision == FraudDecision::Block {
            Some(self.open_case(record)?)
        } else {
            None
        };

        if record.decision != FraudDecision::Allow {
            event::emit(
                self.audit,
                ACTOR,
                record.created_at,
                AuditEvent::FraudDecisionRecorded {
                    score_id: record.score_id.clone(),
                    customer_id: record.customer_id.clone(),
                    transaction_id: record.transaction_id.clone(),
                    score: record.score,
                    decision: record.decision.as_str().to_string(),
                    factor_count: record.factors.len(),
                },
            )?;
        }
        Ok(case_id)
    }

    fn open_case(&self, record: &FraudScoreRecord) -> GateResult<EntityId> {
        let case = FraudCase {
            case_id: format!("fc-{}", uuid::Uuid::new_v4()),
            score_id: record.score_id.clone(),
            customer_id: record.customer_id.clone(),
            transaction_id: record.transaction_id.clone(),
            priority: CasePriority::from_score(record.score),
            status: CaseStatus::Open,
            amount_at_risk: record.amount,
            amount_recovered: 0.0,
            opened_at: record.created_at,
            updated_at: record.created_at,
        };
        self.store.insert_fraud_case(&case)?;
        event::emit(
            self.audit,
            ACTOR,
            record.created_at,
            AuditEvent::FraudCaseOpened {
                case_id: case.case_id.clone(),
                customer_id: case.customer_id.clone(),
                priority: case.priority.as_str().to_string(),
                amount_at_risk: case.amount_at_risk,
            },
        )?;
        Ok(case.case_id)
    }

    fn evaluate_rule(&self, rule: &FraudRule, input: &FraudInput) -> GateResult<Option<FraudFactor>> {
        let exclude = input.transaction_id.as_deref();
        let description = match &rule.condition {
            FraudCondition::Velocity { window_minutes, max_transactions } => {
                let since = self.clock.now_ts() - i64::from(*window_minutes) * 60;
                let count = self
                    .store
                    .count_customer_txns_since(&input.customer_id, since, exclude)?;
                (count >= i64::from(*max_transactions)).then(|| {
                    format!("{count} transactions in the last {window_minutes} minutes")
                })
            }
            FraudCondition::AmountThreshold { threshold } => (input.amount >= *threshold)
                .then(|| format!("Amount {:.2} at or above {:.2}", input.amount, threshold)),
            FraudCondition::AmountMultiplier { multiplier, sample_size } => {
                let average = self
                    .store
                    .average_recent_debit(&input.customer_id, *sample_size, exclude)?;
                average.and_then(|avg| {
                    (input.amount > avg * multiplier).then(|| {
                        format!(
                            "Amount {:.2} exceeds {multiplier}x the recent average of {avg:.2}",
                            input.amount
                        )
                    })
                })
            }
            FraudCondition::Behavioural { threshold } => (input.is_new_payee
                && input.amount >= *threshold)
                .then(|| format!("New payee with amount {:.2}", input.amount)),
            FraudCondition::TimeBased { start_hour, end_hour } => {
                let hour = self.clock.now().hour();
                in_hour_window(hour, *start_hour, *end_hour)
                    .then(|| format!("Requested at an unusual hour ({hour:02}:00 UTC)"))
            }
            FraudCondition::Geographic { high_risk_countries } => input
                .country
                .as_deref()
                .filter(|c| high_risk_countries.iter().any(|h| h.eq_ignore_ascii_case(c)))
                .map(|c| format!("Request from high-risk country {c}")),
            FraudCondition::Device => match input.device_id.as_deref() {
                Some(device) if !self.store.device_seen(&input.customer_id, device, exclude)? => {
                    Some("Request from an unrecognised device".to_string())
                }
                _ => None,
            },
        };

        Ok(description.map(|description| FraudFactor {
            rule: rule.name.clone(),
            points: rule.weight,
            description,
        }))
    }
}

/// Sum of factor points, clamped to MAX_SCORE.
pub fn total_score(factors: &[FraudFactor]) -> u32 {
    factors
        .iter()
        .fold(0u32, |acc, f| acc.saturating_add(f.points))
        .min(MAX_SCORE)
}

/// `[start, end)` in hours; wraps past midnight when start > end.
fn in_hour_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}
