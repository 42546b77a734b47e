//! Audit log persistence. The gate only appends; reads exist for operators
//! and tests.

use super::GateStore;
use crate::{
    error::GateResult,
    event::{AuditRecord, AuditSink},
};
use rusqlite::params;

impl AuditSink for GateStore {
    fn emit(&self, record: &AuditRecord) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (event_type, actor, target, action, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &record.event_type,
                &record.actor,
                &record.target,
                &record.action,
                &record.detail,
                record.created_at,
            ],
        )?;
        Ok(())
    }
}

impl GateStore {
    pub fn audit_records(&self, event_type: &str) -> GateResult<Vec<AuditRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_type, actor, target, action, detail, created_at
             FROM audit_log WHERE event_type = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![event_type], |r| {
            Ok(AuditRecord {
                id: r.get(0)?,
                event_type: r.get(1)?,
                actor: r.get(2)?,
                target: r.get(3)?,
                action: r.get(4)?,
                detail: r.get(5)?,
                created_at: r.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn audit_count(&self) -> GateResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |r| r.get(0))?;
        Ok(count)
    }
}
