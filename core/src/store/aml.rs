//! AML alert queries.

use super::GateStore;
use crate::{
    aml_monitor::{AlertSeverity, AlertStatus, AmlAlert, AmlAlertType},
    error::{GateError, GateResult},
};
use rusqlite::{params, OptionalExtension, Row};

const ALERT_COLUMNS: &str = "SELECT alert_id, customer_id, transaction_id, alert_type, severity,
        reason, amount, status, created_at, updated_at
 FROM aml_alert";

impl GateStore {
    pub fn insert_aml_alert(&self, a: &AmlAlert) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO aml_alert
             (alert_id, customer_id, transaction_id, alert_type, severity,
              reason, amount, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &a.alert_id,
                &a.customer_id,
                &a.transaction_id,
                a.alert_type.as_str(),
                a.severity.as_str(),
                &a.reason,
                a.amount,
                a.status.as_str(),
                a.created_at,
                a.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_aml_alert(&self, alert_id: &str) -> GateResult<Option<AmlAlert>> {
        let row = self
            .conn
            .query_row(
                &format!("{ALERT_COLUMNS} WHERE alert_id = ?1"),
                params![alert_id],
                alert_from_row,
            )
            .optional()?;
        row.map(finish_alert).transpose()
    }

    pub fn aml_alerts_for_customer(&self, customer_id: &str) -> GateResult<Vec<AmlAlert>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ALERT_COLUMNS} WHERE customer_id = ?1 ORDER BY created_at, alert_id"
        ))?;
        let rows = stmt.query_map(params![customer_id], alert_from_row)?;
        let mut result = Vec::new();
        for r in rows {
            result.push(finish_alert(r?)?);
        }
        Ok(result)
    }

    /// Alerts that ended in a regulatory report, i.e. the customer's history of
    /// confirmed suspicious activity.
    pub fn reported_aml_alert_count(&self, customer_id: &str) -> GateResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM aml_alert WHERE customer_id = ?1 AND status = 'reported'",
            params![customer_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn update_aml_alert_status(&self, a: &AmlAlert, expected: AlertStatus) -> GateResult<()> {
        let changed = self.conn.execute(
            "UPDATE aml_alert SET status = ?2, updated_at = ?3
             WHERE alert_id = ?1 AND status = ?4",
            params![&a.alert_id, a.status.as_str(), a.updated_at, expected.as_str()],
        )?;
        if changed == 0 {
            return Err(GateError::InvalidTransition {
                entity: "AML alert",
                from: expected.as_str().to_string(),
                to: a.status.as_str().to_string(),
            });
        }
        Ok(())
    }
}

type RawAlert = (AmlAlert, String, String, String);

fn alert_from_row(r: &Row<'_>) -> rusqlite::Result<RawAlert> {
    Ok((
        AmlAlert {
            alert_id: r.get(0)?,
            customer_id: r.get(1)?,
            transaction_id: r.get(2)?,
            alert_type: AmlAlertType::LargeTransaction,
            severity: AlertSeverity::Low,
            reason: r.get(5)?,
            amount: r.get(6)?,
            status: AlertStatus::New,
            created_at: r.get(8)?,
            updated_at: r.get(9)?,
        },
        r.get(3)?,
        r.get(4)?,
        r.get(7)?,
    ))
}

fn finish_alert((mut alert, alert_type, severity, status): RawAlert) -> GateResult<AmlAlert> {
    alert.alert_type = AmlAlertType::parse(&alert_type)
        .ok_or_else(|| anyhow::anyhow!("unknown AML alert type '{alert_type}'"))?;
    alert.severity = AlertSeverity::parse(&severity)
        .ok_or_else(|| anyhow::anyhow!("unknown AML severity '{severity}'"))?;
    alert.status = AlertStatus::parse(&status)
        .ok_or_else(|| anyhow::anyhow!("unknown AML alert status '{status}'"))?;
    Ok(alert)
}
