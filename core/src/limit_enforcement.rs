//! Limit Enforcement: KYC-tier caps on outgoing money.
//!
//! Checks run in a fixed order and the first failure wins:
//!   1. Single-transaction cap (no history needed)
//!   2. Daily cap: completed debits since 00:00 UTC + this amount
//!   3. Monthly cap: completed debits since the 1st, 00:00 UTC + this amount
//!
//! Read-only. Nothing is persisted here.

use crate::{
    clock::{start_of_day, start_of_month, Clock},
    config::{GateConfig, MissingConfigPolicy},
    error::{GateError, GateResult},
    store::GateStore,
    types::{validate_amount, Amount},
};
use serde::{Deserialize, Serialize};

/// Tier assumed when the customer has none on record.
pub const DEFAULT_KYC_TIER: &str = "basic";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LimitViolation {
    SingleTransaction,
    Daily,
    Monthly,
    NoLimitConfigured,
}

/// Outcome plus the numbers needed to render remaining headroom.
/// A `None` limit means the tier is unrestricted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitCheck {
    pub allowed:       bool,
    pub reason:        Option<String>,
    pub violation:     Option<LimitViolation>,
    pub kyc_tier:      String,
    pub daily_used:    Amount,
    pub daily_limit:   Option<Amount>,
    pub monthly_used:  Amount,
    pub monthly_limit: Option<Amount>,
    pub single_limit:  Option<Amount>,
}

impl LimitCheck {
    pub fn daily_remaining(&self) -> Option<Amount> {
        self.daily_limit.map(|l| (l - self.daily_used).max(0.0))
    }

    pub fn monthly_remaining(&self) -> Option<Amount> {
        self.monthly_limit.map(|l| (l - self.monthly_used).max(0.0))
    }

    fn reject(mut self, violation: LimitViolation, reason: String) -> Self {
        log::info!("limits: tier={} rejected ({violation:?})", self.kyc_tier);
        self.allowed = false;
        self.violation = Some(violation);
        self.reason = Some(reason);
        self
    }
}

pub struct LimitEnforcer<'a> {
    store: &'a GateStore,
    clock: &'a dyn Clock,
}

impl<'a> LimitEnforcer<'a> {
    pub fn new(store: &'a GateStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    pub fn check(
        &self,
        config: &GateConfig,
        customer_id: &str,
        amount: Amount,
        kyc_tier: Option<&str>,
    ) -> GateResult<LimitCheck> {
        if customer_id.trim().is_empty() {
            return Err(GateError::validation("customer id is required"));
        }
        validate_amount(amount)?;
        let tier = match kyc_tier {
            None => DEFAULT_KYC_TIER,
            Some(t) if t.trim().is_empty() => {
                return Err(GateError::validation("KYC tier must not be blank"))
            }
            Some(t) => t,
        };

        let Some(limit) = config.limit_for_tier(tier) else {
            return Ok(self.unconfigured(config.missing_config_policy, tier));
        };

        // Every outcome, rejections included, reports both windows.
        let now = self.clock.now();
        let daily_used = self
            .store
            .sum_completed_debits_since(customer_id, start_of_day(now))?;
        let monthly_used = self
            .store
            .sum_completed_debits_since(customer_id, start_of_month(now))?;

        let check = LimitCheck {
            allowed:       true,
            reason:        None,
            violation:     None,
            kyc_tier:      tier.to_string(),
            daily_used,
            daily_limit:   Some(limit.daily_limit),
            monthly_used,
            monthly_limit: Some(limit.monthly_limit),
            single_limit:  Some(limit.single_limit),
        };

        if amount > limit.single_limit {
            return Ok(check.reject(
                LimitViolation::SingleTransaction,
                format!(
                    "Amount £{amount:.2} exceeds the single transaction limit of £{:.2}",
                    limit.single_limit
                ),
            ));
        }

        if daily_used + amount > limit.daily_limit {
            return Ok(check.reject(
                LimitViolation::Daily,
                format!(
                    "Daily limit exceeded: £{daily_used:.2} of £{:.2} already used today, £{:.2} remaining",
                    limit.daily_limit,
                    (limit.daily_limit - daily_used).max(0.0)
                ),
            ));
        }

        if monthly_used + amount > limit.monthly_limit {
            return Ok(check.reject(
                LimitViolation::Monthly,
                format!(
                    "Monthly limit exceeded: £{monthly_used:.2} of £{:.2} already used this month, £{:.2} remaining",
                    limit.monthly_limit,
                    (limit.monthly_limit - monthly_used).max(0.0)
                ),
            ));
        }

        Ok(check)
    }

    fn unconfigured(&self, policy: MissingConfigPolicy, tier: &str) -> LimitCheck {
        let check = LimitCheck {
            allowed:       true,
            reason:        None,
            violation:     None,
            kyc_tier:      tier.to_string(),
            daily_used:    0.0,
            daily_limit:   None,
            monthly_used:  0.0,
            monthly_limit: None,
            single_limit:  None,
        };
        match policy {
            MissingConfigPolicy::FailOpen => {
                log::warn!("limits: no limit configured for tier '{tier}', allowing");
                check
            }
            MissingConfigPolicy::FailClosed => {
                log::warn!("limits: no limit configured for tier '{tier}', rejecting");
                check.reject(
                    LimitViolation::NoLimitConfigured,
                    "Transfers are unavailable for your verification level. Please contact support."
                        .to_string(),
                )
            }
        }
    }
}
