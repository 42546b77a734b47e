//! Customer-level risk rating.
//!
//! `rate` is pure: the same factors always give the same rating.
//! `RiskAssessor` gathers factors from the store and persists the result;
//! the persisted rating is what feeds KYC tier decisions elsewhere.

use crate::{
    clock::Clock,
    error::{GateError, GateResult},
    event::{self, AuditEvent, AuditSink},
    fraud_case::CaseStatus,
    store::GateStore,
    types::{Amount, Timestamp},
};
use serde::{Deserialize, Serialize};

pub const MAX_RISK_SCORE: u32 = 100;
pub const VERY_HIGH_THRESHOLD: u32 = 76;
pub const HIGH_THRESHOLD: u32 = 51;
pub const MEDIUM_THRESHOLD: u32 = 26;

const PEP_POINTS: u32 = 30;
const INCIDENT_POINTS: u32 = 15;
const INCIDENT_CAP: u32 = 45;
const NEW_ACCOUNT_DAYS: i64 = 90;
const VOLUME_WINDOW_SECS: i64 = 30 * 86_400;

const ACTOR: &str = "risk_rating_engine";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CustomerCategory {
    Individual,
    Business,
    HighNetWorth,
}

impl CustomerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual   => "individual",
            Self::Business     => "business",
            Self::HighNetWorth => "high_net_worth",
        }
    }

    /// Unknown categories rate as individual.
    pub fn parse(s: &str) -> Self {
        match s {
            "business" => Self::Business,
            "high_net_worth" => Self::HighNetWorth,
            _ => Self::Individual,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskFactors {
    pub volume_30d:           Amount,
    pub largest_transaction:  Amount,
    pub is_pep:               bool,
    pub category:             CustomerCategory,
    pub account_age_days:     i64,
    pub identity_verified:    bool,
    pub address_verified:     bool,
    pub suspicious_incidents: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskTier {
    pub fn from_score(score: u32) -> Self {
        if score >= VERY_HIGH_THRESHOLD {
            Self::VeryHigh
        } else if score >= HIGH_THRESHOLD {
            Self::High
        } else if score >= MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "low",
            Self::Medium   => "medium",
            Self::High     => "high",
            Self::VeryHigh => "very_high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "very_high" => Some(Self::VeryHigh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskContribution {
    pub factor: String,
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskRating {
    pub score: u32,
    pub tier: RiskTier,
    pub factors: Vec<RiskContribution>,
}

/// A rating as persisted for a customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskRatingRecord {
    pub customer_id: String,
    pub rating: RiskRating,
    pub assessed_at: Timestamp,
}

fn volume_points(volume: Amount) -> u32 {
    if volume > 100_000.0 {
        25
    } else if volume > 50_000.0 {
        15
    } else if volume > 20_000.0 {
        10
    } else {
        0
    }
}

fn largest_transaction_points(largest: Amount) -> u32 {
    if largest > 10_000.0 {
        20
    } else if largest > 5_000.0 {
        10
    } else {
        0
    }
}

/// Score a customer. Points are additive and the total is capped at 100.
pub fn rate(factors: &RiskFactors) -> GateResult<RiskRating> {
    for (name, value) in [
        ("volume_30d", factors.volume_30d),
        ("largest_transaction", factors.largest_transaction),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(GateError::validation(format!("{name} must be a non-negative amount")));
        }
    }

    let mut contributions = Vec::new();
    let mut add = |factor: &str, points: u32| {
        if points > 0 {
            contributions.push(RiskContribution {
                factor: factor.to_string(),
                points,
            });
        }
    };

    if factors.is_pep {
        add("pep", PEP_POINTS);
    }
    add("volume_30d", volume_points(factors.volume_30d));
    add("largest_transaction", largest_transaction_points(factors.largest_transaction));
    if factors.category == CustomerCategory::HighNetWorth {
        add("high_net_worth", 10);
    }
    if factors.account_age_days < NEW_ACCOUNT_DAYS {
        add("new_account", 10);
    }
    if !factors.identity_verified {
        add("identity_unverified", 15);
    }
    if !factors.address_verified {
        add("address_unverified", 10);
    }
    add(
        "suspicious_incidents",
        factors
            .suspicious_incidents
            .saturating_mul(INCIDENT_POINTS)
            .min(INCIDENT_CAP),
    );

    let score = contributions
        .iter()
        .fold(0u32, |acc, c| acc.saturating_add(c.points))
        .min(MAX_RISK_SCORE);

    Ok(RiskRating {
        score,
        tier: RiskTier::from_score(score),
        factors: contributions,
    })
}

pub struct RiskAssessor<'a> {
    store: &'a GateStore,
    clock: &'a dyn Clock,
    audit: &'a dyn AuditSink,
}

impl<'a> RiskAssessor<'a> {
    pub fn new(store: &'a GateStore, clock: &'a dyn Clock, audit: &'a dyn AuditSink) -> Self {
        Self { store, clock, audit }
    }

    /// Collect the customer's factors from stored history.
    /// Incidents are reported AML alerts plus confirmed fraud cases.
    pub fn factors_for(&self, customer_id: &str) -> GateResult<RiskFactors> {
        let customer = self
            .store
            .get_customer(customer_id)?
            .ok_or(GateError::NotFound { entity: "Customer" })?;
        let now = self.clock.now_ts();

        let (volume_30d, largest_transaction) =
            self.store.customer_volume_since(customer_id, now - VOLUME_WINDOW_SECS)?;
        let reported_alerts = self.store.reported_aml_alert_count(customer_id)?;
        let confirmed_fraud = self
            .store
            .fraud_cases_for_customer(customer_id)?
            .iter()
            .filter(|c| c.status == CaseStatus::ConfirmedFraud)
            .count() as i64;

        Ok(RiskFactors {
            volume_30d,
            largest_transaction,
            is_pep: customer.is_pep,
            category: CustomerCategory::parse(&customer.category),
            account_age_days: (now - customer.opened_at).max(0) / 86_400,
            identity_verified: customer.identity_verified,
            address_verified: customer.address_verified,
            suspicious_incidents: u32::try_from(reported_alerts + confirmed_fraud).unwrap_or(u32::MAX),
        })
    }

    /// Rate the customer from stored data and persist the rating.
    pub fn assess_customer(&self, customer_id: &str) -> GateResult<RiskRating> {
        let factors = self.factors_for(customer_id)?;
        let rating = rate(&factors)?;
        let now = self.clock.now_ts();

        self.store.insert_risk_rating(customer_id, &rating, now)?;
        event::emit(
            self.audit,
            ACTOR,
            now,
            AuditEvent::CustomerRiskRated {
                customer_id: customer_id.to_string(),
                score: rating.score,
                tier: rating.tier.as_str().to_string(),
            },
        )?;

        log::info!(
            "risk: customer={customer_id} score={} tier={}",
            rating.score,
            rating.tier.as_str()
        );
        Ok(rating)
    }
}
