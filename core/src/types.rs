//! Shared primitive types used across the gate.

use serde::{Deserialize, Serialize};

/// A stable, unique identifier for a customer, account, or record.
pub type EntityId = String;

/// UTC unix seconds. Every persisted timestamp uses this representation.
pub type Timestamp = i64;

/// Monetary amount in the ledger currency (GBP).
pub type Amount = f64;

/// Reject NaN, infinities and non-positive amounts before any I/O.
pub fn validate_amount(amount: Amount) -> crate::error::GateResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(crate::error::GateError::validation(format!(
            "amount must be a positive number, got {amount}"
        )));
    }
    Ok(())
}

/// Direction of a ledger movement relative to the customer's account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}
