//! SCA challenge queries.
//!
//! RULE: the attempt counter is only ever touched inside
//! `attempt_challenge`, under an immediate (write-locked) transaction.

use super::GateStore;
use crate::{error::GateResult, types::{EntityId, Timestamp}};
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};

#[derive(Clone, PartialEq)]
pub struct ChallengeRow {
    pub challenge_id: EntityId,
    pub customer_id:  EntityId,
    pub(crate) code:  String,
    pub action:       String,
    pub metadata:     Option<String>,
    pub attempts:     u32,
    pub max_attempts: u32,
    pub verified:     bool,
    pub verified_at:  Option<Timestamp>,
    pub expires_at:   Timestamp,
    pub created_at:   Timestamp,
}

impl std::fmt::Debug for ChallengeRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeRow")
            .field("challenge_id", &self.challenge_id)
            .field("customer_id", &self.customer_id)
            .field("code", &"******")
            .field("action", &self.action)
            .field("attempts", &self.attempts)
            .field("max_attempts", &self.max_attempts)
            .field("verified", &self.verified)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What one verification attempt did to the stored challenge.
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeAttempt {
    NotFound,
    AlreadyVerified(ChallengeRow),
    Expired(ChallengeRow),
    Exhausted(ChallengeRow),
    /// The attempt was counted and the code matched.
    Matched(ChallengeRow),
    /// The attempt was counted and the code did not match.
    Mismatched(ChallengeRow),
}

const CHALLENGE_COLUMNS: &str = "SELECT challenge_id, customer_id, code, action, metadata,
        attempts, max_attempts, verified, verified_at, expires_at, created_at
 FROM sca_challenge";

impl GateStore {
    pub fn insert_challenge(&self, c: &ChallengeRow) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO sca_challenge
             (challenge_id, customer_id, code, action, metadata, attempts,
              max_attempts, verified, verified_at, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &c.challenge_id,
                &c.customer_id,
                &c.code,
                &c.action,
                &c.metadata,
                c.attempts,
                c.max_attempts,
                c.verified,
                c.verified_at,
                c.expires_at,
                c.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_challenge(&self, challenge_id: &str) -> GateResult<Option<ChallengeRow>> {
        let row = self
            .conn
            .query_row(
                &format!("{CHALLENGE_COLUMNS} WHERE challenge_id = ?1"),
                params![challenge_id],
                challenge_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Check state, count the attempt, and compare the code as one unit.
    ///
    /// The immediate transaction takes the write lock before the row is
    /// read, so two concurrent callers can never both observe
    /// `attempts < max_attempts` for the same final slot. The increment is
    /// additionally conditional on that predicate at write time.
    pub fn attempt_challenge<F>(
        &self,
        challenge_id: &str,
        now: Timestamp,
        code_matches: F,
    ) -> GateResult<ChallengeAttempt>
    where
        F: FnOnce(&str) -> bool,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let row = tx
            .query_row(
                &format!("{CHALLENGE_COLUMNS} WHERE challenge_id = ?1"),
                params![challenge_id],
                challenge_from_row,
            )
            .optional()?;
        let Some(mut row) = row else {
            return Ok(ChallengeAttempt::NotFound);
        };

        if row.verified {
            return Ok(ChallengeAttempt::AlreadyVerified(row));
        }
        if now >= row.expires_at {
            return Ok(ChallengeAttempt::Expired(row));
        }
        if row.attempts >= row.max_attempts {
            return Ok(ChallengeAttempt::Exhausted(row));
        }

        let counted = tx.execute(
            "UPDATE sca_challenge SET attempts = attempts + 1
             WHERE challenge_id = ?1 AND verified = 0 AND attempts < max_attempts",
            params![challenge_id],
        )?;
        if counted == 0 {
            return Ok(ChallengeAttempt::Exhausted(row));
        }
        row.attempts += 1;

        let outcome = if code_matches(&row.code) {
            tx.execute(
                "UPDATE sca_challenge SET verified = 1, verified_at = ?2
                 WHERE challenge_id = ?1 AND verified = 0",
                params![challenge_id, now],
            )?;
            row.verified = true;
            row.verified_at = Some(now);
            ChallengeAttempt::Matched(row)
        } else {
            ChallengeAttempt::Mismatched(row)
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Remove a challenge that was never verified. Returns false if it was
    /// already gone or had been verified.
    pub fn delete_pending_challenge(&self, challenge_id: &str) -> GateResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM sca_challenge WHERE challenge_id = ?1 AND verified = 0",
            params![challenge_id],
        )?;
        Ok(removed == 1)
    }

    /// Drop unverified challenges that expired before `before`.
    /// Verified challenges are kept so they stay re-confirmable.
    pub fn purge_expired_challenges(&self, before: Timestamp) -> GateResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM sca_challenge WHERE verified = 0 AND expires_at < ?1",
            params![before],
        )?;
        Ok(removed)
    }
}

fn challenge_from_row(r: &Row<'_>) -> rusqlite::Result<ChallengeRow> {
    Ok(ChallengeRow {
        challenge_id: r.get(0)?,
        customer_id: r.get(1)?,
        code: r.get(2)?,
        action: r.get(3)?,
        metadata: r.get(4)?,
        attempts: r.get(5)?,
        max_attempts: r.get(6)?,
        verified: r.get(7)?,
        verified_at: r.get(8)?,
        expires_at: r.get(9)?,
        created_at: r.get(10)?,
    })
}
