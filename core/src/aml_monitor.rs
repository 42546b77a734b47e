//! AML Transaction Monitor.
//!
//! Runs the statutory detection checks against one transaction,
//! independent of fraud scoring. Checks are additive; one transaction can
//! raise several alerts:
//!   - Large transaction (≥ 10k; critical at ≥ 50k)
//!   - Velocity (more than 5 transactions in the trailing hour)
//!   - Structuring (8k–10k with 2+ similar in the trailing 24 hours)
//!   - Watchlist (counterparty on the configured watchlist)
//!
//! Only a critical alert fails the gate. Everything else is advisory and
//! goes to case management.

use crate::{
    clock::Clock,
    config::{AmlConfig, GateConfig},
    error::{GateError, GateResult},
    event::{self, AuditEvent, AuditSink},
    store::GateStore,
    types::{validate_amount, Amount, EntityId, Timestamp},
};
use serde::{Deserialize, Serialize};

const ACTOR: &str = "aml_monitor";

// ── Data Structures ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "low",
            Self::Medium   => "medium",
            Self::High     => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AmlAlertType {
    LargeTransaction,
    Velocity,
    Structuring,
    WatchlistMatch,
}

impl AmlAlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LargeTransaction => "large_transaction",
            Self::Velocity         => "velocity",
            Self::Structuring      => "structuring",
            Self::WatchlistMatch   => "watchlist_match",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "large_transaction" => Some(Self::LargeTransaction),
            "velocity" => Some(Self::Velocity),
            "structuring" => Some(Self::Structuring),
            "watchlist_match" => Some(Self::WatchlistMatch),
            _ => None,
        }
    }
}

/// new → investigating | escalated → dismissed | reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Investigating,
    Escalated,
    Dismissed,
    Reported,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New           => "new",
            Self::Investigating => "investigating",
            Self::Escalated     => "escalated",
            Self::Dismissed     => "dismissed",
            Self::Reported      => "reported",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "investigating" => Some(Self::Investigating),
            "escalated" => Some(Self::Escalated),
            "dismissed" => Some(Self::Dismissed),
            "reported" => Some(Self::Reported),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, next),
            (New, Investigating)
                | (New, Escalated)
                | (Investigating, Escalated)
                | (Investigating, Dismissed)
                | (Investigating, Reported)
                | (Escalated, Dismissed)
                | (Escalated, Reported)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmlAlert {
    pub alert_id:       EntityId,
    pub customer_id:    EntityId,
    pub transaction_id: Option<EntityId>,
    pub alert_type:     AmlAlertType,
    pub severity:       AlertSeverity,
    pub reason:         String,
    pub amount:         Amount,
    pub status:         AlertStatus,
    pub created_at:     Timestamp,
    pub updated_at:     Timestamp,
}

#[derive(Debug, Clone, Default)]
pub struct AmlInput {
    pub customer_id:    EntityId,
    pub transaction_id: Option<EntityId>,
    pub amount:         Amount,
    pub txn_type:       String,
    pub counterparty:   Option<String>,
}

impl AmlInput {
    pub fn new(customer_id: impl Into<EntityId>, amount: Amount, txn_type: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            amount,
            txn_type: txn_type.into(),
            ..Self::default()
        }
    }

    pub fn with_transaction(mut self, transaction_id: impl Into<EntityId>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_counterparty(mut self, name: impl Into<String>) -> Self {
        self.counterparty = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmlCheck {
    pub passed: bool,
    pub alerts: Vec<AmlAlert>,
}

impl AmlCheck {
    pub fn has_alert(&self, alert_type: AmlAlertType) -> bool {
        self.alerts.iter().any(|a| a.alert_type == alert_type)
    }
}

/// A check that fired, before it becomes a persisted alert.
struct Finding {
    alert_type: AmlAlertType,
    severity: AlertSeverity,
    reason: String,
}

// ── Monitor ──────────────────────────────────────────────────────────────────

pub struct AmlMonitor<'a> {
    store: &'a GateStore,
    clock: &'a dyn Clock,
    audit: &'a dyn AuditSink,
}

impl<'a> AmlMonitor<'a> {
    pub fn new(store: &'a GateStore, clock: &'a dyn Clock, audit: &'a dyn AuditSink) -> Self {
        Self { store, clock, audit }
    }

    pub fn check(&self, config: &GateConfig, input: &AmlInput) -> GateResult<AmlCheck> {
        if input.customer_id.trim().is_empty() {
            return Err(GateError::validation("customer id is required"));
        }
        validate_amount(input.amount)?;

        let aml = &config.aml;
        let now = self.clock.now_ts();
        let mut findings = Vec::new();

        if let Some(f) = large_transaction(aml, input.amount) {
            findings.push(f);
        }
        findings.extend(self.detect_velocity(aml, input, now)?);
        findings.extend(self.detect_structuring(aml, input, now)?);
        if let Some(f) = watchlist_match(aml, input.counterparty.as_deref()) {
            findings.push(f);
        }

        let mut alerts = Vec::with_capacity(findings.len());
        for finding in findings {
            let alert = AmlAlert {
                alert_id: format!("aml-{}", uuid::Uuid::new_v4()),
                customer_id: input.customer_id.clone(),
                transaction_id: input.transaction_id.clone(),
                alert_type: finding.alert_type,
                severity: finding.severity,
                reason: finding.reason,
                amount: input.amount,
                status: AlertStatus::New,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_aml_alert(&alert)?;
            alerts.push(alert);
        }

        let passed = !alerts.iter().any(|a| a.severity == AlertSeverity::Critical);

        if !alerts.is_empty() {
            event::emit(
                self.audit,
                ACTOR,
                now,
                AuditEvent::AmlAlertsRaised {
                    customer_id: input.customer_id.clone(),
                    transaction_id: input.transaction_id.clone(),
                    alert_count: alerts.len(),
                    amount: input.amount,
                    alert_types: alerts.iter().map(|a| a.alert_type.as_str().to_string()).collect(),
                    passed,
                },
            )?;
            log::warn!(
                "aml: customer={} type={} amount={:.2} alerts={} passed={passed}",
                input.customer_id,
                input.txn_type,
                input.amount,
                alerts.len()
            );
        }

        Ok(AmlCheck { passed, alerts })
    }

    fn detect_velocity(
        &self,
        aml: &AmlConfig,
        input: &AmlInput,
        now: Timestamp,
    ) -> GateResult<Option<Finding>> {
        let count = self.store.count_customer_txns_since(
            &input.customer_id,
            now - aml.velocity_window_seconds,
            input.transaction_id.as_deref(),
        )?;
        Ok((count > aml.velocity_max_transactions).then(|| Finding {
            alert_type: AmlAlertType::Velocity,
            severity: AlertSeverity::Medium,
            reason: format!(
                "{count} transactions in the last {} minutes",
                aml.velocity_window_seconds / 60
            ),
        }))
    }

    fn detect_structuring(
        &self,
        aml: &AmlConfig,
        input: &AmlInput,
        now: Timestamp,
    ) -> GateResult<Option<Finding>> {
        if input.amount < aml.structuring_lower_bound || input.amount >= aml.structuring_upper_bound {
            return Ok(None);
        }
        let similar = self.store.count_customer_txns_in_range_since(
            &input.customer_id,
            aml.structuring_lower_bound,
            aml.structuring_upper_bound,
            now - aml.structuring_window_seconds,
            input.transaction_id.as_deref(),
        )?;
        Ok((similar >= aml.structuring_min_prior).then(|| Finding {
            alert_type: AmlAlertType::Structuring,
            severity: AlertSeverity::High,
            reason: format!(
                "{} transactions between {:.0} and {:.0} in the last {} hours",
                similar + 1,
                aml.structuring_lower_bound,
                aml.structuring_upper_bound,
                aml.structuring_window_seconds / 3600
            ),
        }))
    }

    /// Move an alert along its lifecycle.
    pub fn transition_alert(&self, alert_id: &str, next: AlertStatus, actor: &str) -> GateResult<AmlAlert> {
        let mut alert = self
            .store
            .get_aml_alert(alert_id)?
            .ok_or(GateError::NotFound { entity: "AML alert" })?;
        if !alert.status.can_transition_to(next) {
            return Err(GateError::InvalidTransition {
                entity: "AML alert",
                from: alert.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        let previous = alert.status;
        alert.status = next;
        alert.updated_at = self.clock.now_ts();
        self.store.update_aml_alert_status(&alert, previous)?;
        event::emit(
            self.audit,
            actor,
            alert.updated_at,
            AuditEvent::AmlAlertStatusChanged {
                alert_id: alert.alert_id.clone(),
                from: previous.as_str().to_string(),
                to: next.as_str().to_string(),
            },
        )?;
        Ok(alert)
    }
}

fn large_transaction(aml: &AmlConfig, amount: Amount) -> Option<Finding> {
    if amount < aml.large_transaction_threshold {
        return None;
    }
    let severity = if amount >= aml.critical_transaction_threshold {
        AlertSeverity::Critical
    } else {
        AlertSeverity::High
    };
    Some(Finding {
        alert_type: AmlAlertType::LargeTransaction,
        severity,
        reason: format!(
            "Transaction of {amount:.2} meets the {:.0} reporting threshold",
            aml.large_transaction_threshold
        ),
    })
}

fn watchlist_match(aml: &AmlConfig, counterparty: Option<&str>) -> Option<Finding> {
    let name = normalize_name(counterparty?);
    if name.is_empty() {
        return None;
    }
    aml.watchlist
        .iter()
        .find(|entry| normalize_name(entry) == name)
        .map(|_| Finding {
            alert_type: AmlAlertType::WatchlistMatch,
            severity: AlertSeverity::Critical,
            reason: "Counterparty matches a watchlist entry".to_string(),
        })
}

/// Lowercase, collapse internal whitespace.
fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_transaction_severity() {
        let aml = AmlConfig::default();
        assert!(large_transaction(&aml, 9_999.99).is_none());
        assert_eq!(large_transaction(&aml, 10_000.0).unwrap().severity, AlertSeverity::High);
        assert_eq!(large_transaction(&aml, 49_999.0).unwrap().severity, AlertSeverity::High);
        assert_eq!(large_transaction(&aml, 50_000.0).unwrap().severity, AlertSeverity::Critical);
    }

    #[test]
    fn watchlist_ignores_case_and_spacing() {
        let aml = AmlConfig {
            watchlist: vec!["Ivan  Petrov".into()],
            ..AmlConfig::default()
        };
        assert!(watchlist_match(&aml, Some(" ivan petrov ")).is_some());
        assert!(watchlist_match(&aml, Some("Ivan Petrova")).is_none());
        assert!(watchlist_match(&aml, None).is_none());
        assert!(watchlist_match(&aml, Some("   ")).is_none());
    }

    #[test]
    fn alert_lifecycle_edges() {
        assert!(AlertStatus::New.can_transition_to(AlertStatus::Escalated));
        assert!(AlertStatus::Escalated.can_transition_to(AlertStatus::Reported));
        assert!(!AlertStatus::New.can_transition_to(AlertStatus::Reported));
        assert!(!AlertStatus::Dismissed.can_transition_to(AlertStatus::Investigating));
    }
}
