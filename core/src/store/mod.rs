//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Components call store methods and never execute SQL directly.

use crate::{
    error::GateResult,
    types::{Amount, Direction, EntityId, Timestamp},
};
mod aml;
mod audit;
mod challenge;
mod fraud;
mod pin;
mod risk;

pub use challenge::{ChallengeAttempt, ChallengeRow};

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GateStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerRecord {
    pub customer_id:       EntityId,
    pub kyc_tier:          Option<String>,
    pub is_pep:            bool,
    pub category:          String,
    pub identity_verified: bool,
    pub address_verified:  bool,
    pub opened_at:         Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub transaction_id: EntityId,
    pub account_id:     EntityId,
    pub amount:         Amount,
    pub direction:      Direction,
    pub status:         String,
    pub txn_type:       String,
    pub counterparty:   Option<String>,
    pub device_id:      Option<String>,
    pub created_at:     Timestamp,
}

impl GateStore {
    pub fn open(path: &str) -> GateResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> GateResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open a second connection to the same database, one per concurrent
    /// request. For in-memory databases this returns a fresh, isolated one.
    pub fn reopen(&self) -> GateResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> GateResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_fraud_aml.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_credentials.sql"))?;
        Ok(())
    }

    /// Run `f` in one immediate transaction on this connection. An error from
    /// `f` rolls back every write it made, including audit rows written
    /// through this store.
    pub fn atomically<T>(&self, f: impl FnOnce() -> GateResult<T>) -> GateResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f()?;
        tx.commit()?;
        Ok(value)
    }

    // ── Customer ───────────────────────────────────────────────

    pub fn insert_customer(&self, c: &CustomerRecord) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO customer (
                customer_id, kyc_tier, is_pep, category,
                identity_verified, address_verified, opened_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &c.customer_id,
                &c.kyc_tier,
                c.is_pep,
                &c.category,
                c.identity_verified,
                c.address_verified,
                c.opened_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_customer(&self, customer_id: &str) -> GateResult<Option<CustomerRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT customer_id, kyc_tier, is_pep, category,
                        identity_verified, address_verified, opened_at
                 FROM customer WHERE customer_id = ?1",
                params![customer_id],
                |r| {
                    Ok(CustomerRecord {
                        customer_id: r.get(0)?,
                        kyc_tier: r.get(1)?,
                        is_pep: r.get(2)?,
                        category: r.get(3)?,
                        identity_verified: r.get(4)?,
                        address_verified: r.get(5)?,
                        opened_at: r.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// The customer's current KYC tier, if one has been assigned.
    pub fn customer_kyc_tier(&self, customer_id: &str) -> GateResult<Option<String>> {
        let tier: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT kyc_tier FROM customer WHERE customer_id = ?1",
                params![customer_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(tier.flatten())
    }

    // ── Account ────────────────────────────────────────────────

    pub fn insert_account(
        &self,
        account_id: &str,
        customer_id: &str,
        opened_at: Timestamp,
    ) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO account (account_id, customer_id, opened_at) VALUES (?1, ?2, ?3)",
            params![account_id, customer_id, opened_at],
        )?;
        Ok(())
    }

    pub fn account_ids_for_customer(&self, customer_id: &str) -> GateResult<Vec<EntityId>> {
        let mut stmt = self.conn.prepare(
            "SELECT account_id FROM account WHERE customer_id = ?1 ORDER BY account_id",
        )?;
        let rows = stmt.query_map(params![customer_id], |r| r.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Transactions ───────────────────────────────────────────

    pub fn insert_transaction(&self, t: &TransactionRecord) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO txn (
                transaction_id, account_id, amount, direction, status,
                txn_type, counterparty, device_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &t.transaction_id,
                &t.account_id,
                t.amount,
                t.direction.as_str(),
                &t.status,
                &t.txn_type,
                &t.counterparty,
                &t.device_id,
                t.created_at,
            ],
        )?;
        Ok(())
    }

    /// Transactions across all of the customer's accounts at or after
    /// `since`, leaving out `exclude` (the transaction under evaluation).
    pub fn count_customer_txns_since(
        &self,
        customer_id: &str,
        since: Timestamp,
        exclude: Option<&str>,
    ) -> GateResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM txn t
             JOIN account a ON a.account_id = t.account_id
             WHERE a.customer_id = ?1 AND t.created_at >= ?2
               AND (?3 IS NULL OR t.transaction_id <> ?3)",
            params![customer_id, since, exclude],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Transactions with `lower <= amount < upper` at or after `since`.
    pub fn count_customer_txns_in_range_since(
        &self,
        customer_id: &str,
        lower: Amount,
        upper: Amount,
        since: Timestamp,
        exclude: Option<&str>,
    ) -> GateResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM txn t
             JOIN account a ON a.account_id = t.account_id
             WHERE a.customer_id = ?1 AND t.created_at >= ?2
               AND t.amount >= ?3 AND t.amount < ?4
               AND (?5 IS NULL OR t.transaction_id <> ?5)",
            params![customer_id, since, lower, upper, exclude],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Mean of the most recent `sample` debits, or None with no debit history.
    pub fn average_recent_debit(
        &self,
        customer_id: &str,
        sample: u32,
        exclude: Option<&str>,
    ) -> GateResult<Option<Amount>> {
        let avg: Option<f64> = self.conn.query_row(
            "SELECT AVG(amount) FROM (
                SELECT t.amount FROM txn t
                JOIN account a ON a.account_id = t.account_id
                WHERE a.customer_id = ?1 AND t.direction = 'debit'
                  AND (?3 IS NULL OR t.transaction_id <> ?3)
                ORDER BY t.created_at DESC, t.transaction_id DESC
                LIMIT ?2
             )",
            params![customer_id, sample as i64, exclude],
            |r| r.get(0),
        )?;
        Ok(avg)
    }

    /// Sum of completed debits across the customer's accounts since `since`.
    pub fn sum_completed_debits_since(
        &self,
        customer_id: &str,
        since: Timestamp,
    ) -> GateResult<Amount> {
        let total: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(t.amount), 0.0) FROM txn t
             JOIN account a ON a.account_id = t.account_id
             WHERE a.customer_id = ?1 AND t.direction = 'debit'
               AND t.status = 'completed' AND t.created_at >= ?2",
            params![customer_id, since],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    /// Total and largest single transaction value since `since`.
    pub fn customer_volume_since(
        &self,
        customer_id: &str,
        since: Timestamp,
    ) -> GateResult<(Amount, Amount)> {
        let row = self.conn.query_row(
            "SELECT COALESCE(SUM(t.amount), 0.0), COALESCE(MAX(t.amount), 0.0) FROM txn t
             JOIN account a ON a.account_id = t.account_id
             WHERE a.customer_id = ?1 AND t.created_at >= ?2",
            params![customer_id, since],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(row)
    }

    /// Whether the customer has transacted from `device_id` before.
    pub fn device_seen(
        &self,
        customer_id: &str,
        device_id: &str,
        exclude: Option<&str>,
    ) -> GateResult<bool> {
        let seen: i64 = self.conn.query_row(
            "SELECT EXISTS (
                SELECT 1 FROM txn t
                JOIN account a ON a.account_id = t.account_id
                WHERE a.customer_id = ?1 AND t.device_id = ?2
                  AND (?3 IS NULL OR t.transaction_id <> ?3)
             )",
            params![customer_id, device_id, exclude],
            |r| r.get(0),
        )?;
        Ok(seen != 0)
    }
}
