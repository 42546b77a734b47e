//! Fraud score and fraud case queries.

use super::GateStore;
use crate::{
    error::{GateError, GateResult},
    fraud_case::{CasePriority, CaseStatus, FraudCase},
    fraud_scoring_engine::{FraudDecision, FraudScoreRecord},
    types::Timestamp,
};
use rusqlite::{params, OptionalExtension, Row};

impl GateStore {
    pub fn insert_fraud_score(&self, s: &FraudScoreRecord) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO fraud_score
             (score_id, customer_id, transaction_id, amount, score, decision, factors, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &s.score_id,
                &s.customer_id,
                &s.transaction_id,
                s.amount,
                s.score,
                s.decision.as_str(),
                serde_json::to_string(&s.factors)?,
                s.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_fraud_score(&self, score_id: &str) -> GateResult<Option<FraudScoreRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT score_id, customer_id, transaction_id, amount, score, decision,
                        factors, review_outcome, reviewed_by, reviewed_at, created_at
                 FROM fraud_score WHERE score_id = ?1",
                params![score_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, f64>(3)?,
                        r.get::<_, u32>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, String>(6)?,
                        r.get::<_, Option<String>>(7)?,
                        r.get::<_, Option<String>>(8)?,
                        r.get::<_, Option<i64>>(9)?,
                        r.get::<_, i64>(10)?,
                    ))
                },
            )
            .optional()?;

        let Some((score_id, customer_id, transaction_id, amount, score, decision, factors,
                  review_outcome, reviewed_by, reviewed_at, created_at)) = row
        else {
            return Ok(None);
        };
        let decision = FraudDecision::parse(&decision)
            .ok_or_else(|| anyhow::anyhow!("unknown fraud decision '{decision}'"))?;
        Ok(Some(FraudScoreRecord {
            score_id,
            customer_id,
            transaction_id,
            amount,
            score,
            decision,
            factors: serde_json::from_str(&factors)?,
            review_outcome,
            reviewed_by,
            reviewed_at,
            created_at,
        }))
    }

    /// Set review fields once. Returns false if the score was already reviewed.
    pub fn record_fraud_review(
        &self,
        score_id: &str,
        reviewer: &str,
        outcome: &str,
        at: Timestamp,
    ) -> GateResult<bool> {
        let changed = self.conn.execute(
            "UPDATE fraud_score
             SET review_outcome = ?2, reviewed_by = ?3, reviewed_at = ?4
             WHERE score_id = ?1 AND review_outcome IS NULL",
            params![score_id, outcome, reviewer, at],
        )?;
        Ok(changed == 1)
    }

    pub fn fraud_score_count(&self, customer_id: &str) -> GateResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM fraud_score WHERE customer_id = ?1",
            params![customer_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // ── Cases ──────────────────────────────────────────────────

    pub fn insert_fraud_case(&self, c: &FraudCase) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO fraud_case
             (case_id, score_id, customer_id, transaction_id, priority, status,
              amount_at_risk, amount_recovered, opened_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &c.case_id,
                &c.score_id,
                &c.customer_id,
                &c.transaction_id,
                c.priority.as_str(),
                c.status.as_str(),
                c.amount_at_risk,
                c.amount_recovered,
                c.opened_at,
                c.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_fraud_case(&self, case_id: &str) -> GateResult<Option<FraudCase>> {
        let row = self
            .conn
            .query_row(
                &format!("{CASE_COLUMNS} WHERE case_id = ?1"),
                params![case_id],
                case_from_row,
            )
            .optional()?;
        row.map(finish_case).transpose()
    }

    pub fn fraud_cases_for_customer(&self, customer_id: &str) -> GateResult<Vec<FraudCase>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CASE_COLUMNS} WHERE customer_id = ?1 ORDER BY opened_at, case_id"))?;
        let rows = stmt.query_map(params![customer_id], case_from_row)?;
        let mut result = Vec::new();
        for r in rows {
            result.push(finish_case(r?)?);
        }
        Ok(result)
    }

    /// Write the case's new status, guarded on the status it was read with.
    pub fn update_fraud_case(&self, c: &FraudCase, expected: CaseStatus) -> GateResult<()> {
        let changed = self.conn.execute(
            "UPDATE fraud_case
             SET status = ?2, amount_recovered = ?3, updated_at = ?4
             WHERE case_id = ?1 AND status = ?5",
            params![
                &c.case_id,
                c.status.as_str(),
                c.amount_recovered,
                c.updated_at,
                expected.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(GateError::InvalidTransition {
                entity: "fraud case",
                from: expected.as_str().to_string(),
                to: c.status.as_str().to_string(),
            });
        }
        Ok(())
    }
}

const CASE_COLUMNS: &str = "SELECT case_id, score_id, customer_id, transaction_id, priority, status,
        amount_at_risk, amount_recovered, opened_at, updated_at
 FROM fraud_case";

type RawCase = (FraudCase, String, String);

fn case_from_row(r: &Row<'_>) -> rusqlite::Result<RawCase> {
    Ok((
        FraudCase {
            case_id: r.get(0)?,
            score_id: r.get(1)?,
            customer_id: r.get(2)?,
            transaction_id: r.get(3)?,
            priority: CasePriority::High,
            status: CaseStatus::Open,
            amount_at_risk: r.get(6)?,
            amount_recovered: r.get(7)?,
            opened_at: r.get(8)?,
            updated_at: r.get(9)?,
        },
        r.get(4)?,
        r.get(5)?,
    ))
}

fn finish_case((mut case, priority, status): RawCase) -> GateResult<FraudCase> {
    case.priority = CasePriority::parse(&priority)
        .ok_or_else(|| anyhow::anyhow!("unknown case priority '{priority}'"))?;
    case.status = CaseStatus::parse(&status)
        .ok_or_else(|| anyhow::anyhow!("unknown case status '{status}'"))?;
    Ok(case)
}
