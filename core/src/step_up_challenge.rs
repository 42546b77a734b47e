//! Step-up (SCA) challenge state machine.
//!
//! pending ──code ok──────────────▶ verified   (terminal, re-confirmable)
//!    │
//!    ├──now ≥ expires_at─────────▶ expired    (terminal)
//!    └──attempts = max_attempts──▶ exhausted  (terminal)
//!
//! The secret code leaves this module exactly once: through CodeDelivery,
//! straight after the challenge is persisted. It is never returned to the
//! caller, logged, or audited.

use crate::{
    clock::Clock,
    config::ScaConfig,
    error::{GateError, GateResult},
    event::{self, AuditEvent, AuditSink},
    rng::{is_well_formed_code, CodeSource},
    store::{ChallengeAttempt, ChallengeRow, GateStore},
    types::{Amount, EntityId, Timestamp},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

const ACTOR: &str = "step_up_service";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Pending,
    Verified,
    Expired,
    Exhausted,
}

impl ChallengeState {
    pub fn of(row: &ChallengeRow, now: Timestamp) -> Self {
        if row.verified {
            Self::Verified
        } else if now >= row.expires_at {
            Self::Expired
        } else if row.attempts >= row.max_attempts {
            Self::Exhausted
        } else {
            Self::Pending
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Returned to the caller on creation. Deliberately has no code field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssuedChallenge {
    pub challenge_id: EntityId,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ChallengeOutcome {
    Verified,
    /// Wrong code; the challenge is still usable if attempts remain.
    Rejected { attempts_remaining: u32 },
}

/// Flat shape for request handlers: `{verified, error?, attempts_remaining?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
}

impl ChallengeResponse {
    pub fn from_result(result: GateResult<ChallengeOutcome>) -> Self {
        match result {
            Ok(ChallengeOutcome::Verified) => Self {
                verified: true,
                error: None,
                attempts_remaining: None,
            },
            Ok(ChallengeOutcome::Rejected { attempts_remaining }) => Self {
                verified: false,
                error: Some(format!(
                    "Incorrect code. {attempts_remaining} attempt(s) remaining."
                )),
                attempts_remaining: Some(attempts_remaining),
            },
            Err(e) => Self {
                verified: false,
                attempts_remaining: matches!(e, GateError::ChallengeExhausted).then_some(0),
                error: Some(e.user_message()),
            },
        }
    }
}

/// Out-of-band channel (SMS, email, push) that hands the code to the customer.
pub trait CodeDelivery {
    fn deliver(
        &self,
        customer_id: &str,
        challenge_id: &str,
        action: &str,
        code: &str,
    ) -> GateResult<()>;
}

/// Whether a request must pass a step-up challenge before it proceeds.
pub fn requires_step_up(sca: &ScaConfig, amount: Option<Amount>, action: Option<&str>) -> bool {
    if !sca.enabled {
        return false;
    }
    let sensitive = action.is_some_and(|a| sca.is_sensitive(a));
    let over_threshold = amount.is_some_and(|a| a > sca.amount_threshold);
    sensitive || over_threshold
}

pub struct StepUpService<'a> {
    store: &'a GateStore,
    clock: &'a dyn Clock,
    codes: &'a dyn CodeSource,
    delivery: &'a dyn CodeDelivery,
    audit: &'a dyn AuditSink,
}

impl<'a> StepUpService<'a> {
    pub fn new(
        store: &'a GateStore,
        clock: &'a dyn Clock,
        codes: &'a dyn CodeSource,
        delivery: &'a dyn CodeDelivery,
        audit: &'a dyn AuditSink,
    ) -> Self {
        Self {
            store,
            clock,
            codes,
            delivery,
            audit,
        }
    }

    /// Issue a new challenge and send its code out of band.
    pub fn create(
        &self,
        sca: &ScaConfig,
        customer_id: &str,
        action: &str,
        metadata: Option<&serde_json::Value>,
    ) -> GateResult<IssuedChallenge> {
        if customer_id.trim().is_empty() {
            return Err(GateError::validation("customer id is required"));
        }
        if action.trim().is_empty() {
            return Err(GateError::validation("action is required"));
        }

        let now = self.clock.now_ts();
        let row = ChallengeRow {
            challenge_id: format!("sca-{}", uuid::Uuid::new_v4()),
            customer_id: customer_id.to_string(),
            code: self.codes.six_digit_code(),
            action: action.to_string(),
            metadata: metadata.map(serde_json::to_string).transpose()?,
            attempts: 0,
            max_attempts: sca.max_attempts,
            verified: false,
            verified_at: None,
            expires_at: now + sca.expiry_seconds,
            created_at: now,
        };
        self.store.insert_challenge(&row)?;
        if let Err(e) = self
            .delivery
            .deliver(&row.customer_id, &row.challenge_id, &row.action, &row.code)
        {
            // Nobody received the code, so the challenge must not stay live.
            log::warn!("sca: delivery failed for challenge {}, withdrawing", row.challenge_id);
            if let Err(cleanup) = self.store.delete_pending_challenge(&row.challenge_id) {
                log::error!("sca: could not withdraw challenge {}: {cleanup}", row.challenge_id);
            }
            return Err(e);
        }

        log::info!(
            "sca: issued challenge {} for customer={} action={}",
            row.challenge_id,
            row.customer_id,
            row.action
        );
        Ok(IssuedChallenge {
            challenge_id: row.challenge_id,
            expires_at: row.expires_at,
        })
    }

    /// Spend one attempt against the challenge.
    pub fn verify(&self, challenge_id: &str, code: &str) -> GateResult<ChallengeOutcome> {
        if !is_well_formed_code(code) {
            return Err(GateError::validation("code must be exactly 6 digits"));
        }

        let now = self.clock.now_ts();
        let attempt = self.store.attempt_challenge(challenge_id, now, |stored| {
            bool::from(stored.as_bytes().ct_eq(code.as_bytes()))
        })?;

        match attempt {
            ChallengeAttempt::NotFound => Err(GateError::NotFound { entity: "Challenge" }),
            ChallengeAttempt::AlreadyVerified(_) => Ok(ChallengeOutcome::Verified),
            ChallengeAttempt::Expired(_) => Err(GateError::ChallengeExpired),
            ChallengeAttempt::Exhausted(_) => Err(GateError::ChallengeExhausted),
            ChallengeAttempt::Matched(row) => {
                event::emit(
                    self.audit,
                    ACTOR,
                    now,
                    AuditEvent::ChallengeVerified {
                        challenge_id: row.challenge_id.clone(),
                        customer_id: row.customer_id.clone(),
                        action: row.action.clone(),
                    },
                )?;
                log::info!("sca: challenge {} verified", row.challenge_id);
                Ok(ChallengeOutcome::Verified)
            }
            ChallengeAttempt::Mismatched(row) => {
                let attempts_remaining = row.max_attempts.saturating_sub(row.attempts);
                if attempts_remaining == 0 {
                    event::emit(
                        self.audit,
                        ACTOR,
                        now,
                        AuditEvent::ChallengeExhausted {
                            challenge_id: row.challenge_id.clone(),
                            customer_id: row.customer_id.clone(),
                        },
                    )?;
                    log::warn!("sca: challenge {} exhausted", row.challenge_id);
                }
                Ok(ChallengeOutcome::Rejected { attempts_remaining })
            }
        }
    }

    /// Re-confirm a challenge without spending an attempt.
    pub fn is_verified(&self, challenge_id: &str) -> GateResult<bool> {
        Ok(self
            .store
            .get_challenge(challenge_id)?
            .is_some_and(|row| row.verified))
    }

    /// True only if the challenge is verified AND was issued to this
    /// customer for this action. Request handlers call this before
    /// finalising the step-up-protected operation.
    pub fn confirm(&self, challenge_id: &str, customer_id: &str, action: &str) -> GateResult<bool> {
        Ok(self
            .store
            .get_challenge(challenge_id)?
            .is_some_and(|row| row.verified && row.customer_id == customer_id && row.action == action))
    }

    pub fn state(&self, challenge_id: &str) -> GateResult<ChallengeState> {
        let row = self
            .store
            .get_challenge(challenge_id)?
            .ok_or(GateError::NotFound { entity: "Challenge" })?;
        Ok(ChallengeState::of(&row, self.clock.now_ts()))
    }

    /// Housekeeping: remove unverified challenges expired for longer than `grace_seconds`.
    pub fn purge_expired(&self, grace_seconds: i64) -> GateResult<usize> {
        let removed = self
            .store
            .purge_expired_challenges(self.clock.now_ts() - grace_seconds)?;
        if removed > 0 {
            log::debug!("sca: purged {removed} expired challenges");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_up_threshold_and_actions() {
        let sca = ScaConfig {
            amount_threshold: 25.0,
            sensitive_actions: vec!["add_payee".into()],
            ..ScaConfig::default()
        };
        assert!(requires_step_up(&sca, Some(30.0), None));
        assert!(!requires_step_up(&sca, Some(25.0), None));
        assert!(!requires_step_up(&sca, Some(10.0), Some("login")));
        assert!(requires_step_up(&sca, Some(10.0), Some("add_payee")));
        assert!(!requires_step_up(&sca, None, None));

        let disabled = ScaConfig { enabled: false, ..sca };
        assert!(!requires_step_up(&disabled, Some(1_000.0), Some("add_payee")));
    }

    #[test]
    fn exhausted_response_reports_zero_remaining() {
        let response = ChallengeResponse::from_result(Err(GateError::ChallengeExhausted));
        assert!(!response.verified);
        assert_eq!(response.attempts_remaining, Some(0));
    }
}
