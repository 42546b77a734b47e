//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use riskgate_core::{
    error::GateResult,
    event::{AuditRecord, AuditSink},
    step_up_challenge::CodeDelivery,
    store::{CustomerRecord, GateStore, TransactionRecord},
    types::{Direction, Timestamp},
};
use std::sync::Mutex;

/// Saturday 2024-06-15 10:00:00 UTC.
pub const T0: Timestamp = 1_718_445_600;
pub const DAY: i64 = 86_400;
pub const HOUR: i64 = 3_600;

pub fn fresh_store() -> GateStore {
    let store = GateStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

/// Verified individual with one account `acc-{id}`, opened a year before T0.
pub fn seed_customer(store: &GateStore, customer_id: &str, kyc_tier: Option<&str>) {
    store
        .insert_customer(&CustomerRecord {
            customer_id: customer_id.into(),
            kyc_tier: kyc_tier.map(str::to_string),
            is_pep: false,
            category: "individual".into(),
            identity_verified: true,
            address_verified: true,
            opened_at: T0 - 365 * DAY,
        })
        .unwrap();
    store
        .insert_account(&format!("acc-{customer_id}"), customer_id, T0 - 365 * DAY)
        .unwrap();
}

pub fn seed_txn(
    store: &GateStore,
    customer_id: &str,
    transaction_id: &str,
    amount: f64,
    direction: Direction,
    status: &str,
    at: Timestamp,
) {
    store
        .insert_transaction(&TransactionRecord {
            transaction_id: transaction_id.into(),
            account_id: format!("acc-{customer_id}"),
            amount,
            direction,
            status: status.into(),
            txn_type: "transfer".into(),
            counterparty: None,
            device_id: None,
            created_at: at,
        })
        .unwrap();
}

pub fn seed_debit(store: &GateStore, customer_id: &str, transaction_id: &str, amount: f64, at: Timestamp) {
    seed_txn(store, customer_id, transaction_id, amount, Direction::Debit, "completed", at);
}

#[derive(Default)]
pub struct RecordingAudit {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAudit {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event_type == event_type)
            .collect()
    }
}

impl AuditSink for RecordingAudit {
    fn emit(&self, record: &AuditRecord) -> GateResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Captures delivered codes so tests can answer their own challenges.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingDelivery {
    pub fn code_for(&self, challenge_id: &str) -> String {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == challenge_id)
            .map(|(_, code)| code.clone())
            .expect("no code delivered for challenge")
    }

    pub fn delivered(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl CodeDelivery for RecordingDelivery {
    fn deliver(&self, _customer_id: &str, challenge_id: &str, _action: &str, code: &str) -> GateResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((challenge_id.to_string(), code.to_string()));
        Ok(())
    }
}

/// Any well-formed code other than `code`.
pub fn wrong_code(code: &str) -> String {
    if code == "000000" { "111111".into() } else { "000000".into() }
}
