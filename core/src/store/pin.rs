//! PIN credential queries. Only hashes ever reach this table.

use super::GateStore;
use crate::{error::GateResult, types::Timestamp};
use rusqlite::{params, OptionalExtension};

impl GateStore {
    pub fn upsert_pin_hash(&self, customer_id: &str, pin_hash: &str, at: Timestamp) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO pin_credential (customer_id, pin_hash, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(customer_id) DO UPDATE SET pin_hash = excluded.pin_hash,
                                                    updated_at = excluded.updated_at",
            params![customer_id, pin_hash, at],
        )?;
        Ok(())
    }

    pub fn get_pin_hash(&self, customer_id: &str) -> GateResult<Option<String>> {
        let hash = self
            .conn
            .query_row(
                "SELECT pin_hash FROM pin_credential WHERE customer_id = ?1",
                params![customer_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// Swap the hash only if it still equals `expected`. Returns whether it did.
    pub fn replace_pin_hash_if(
        &self,
        customer_id: &str,
        expected: &str,
        replacement: &str,
        at: Timestamp,
    ) -> GateResult<bool> {
        let changed = self.conn.execute(
            "UPDATE pin_credential SET pin_hash = ?3, updated_at = ?4
             WHERE customer_id = ?1 AND pin_hash = ?2",
            params![customer_id, expected, replacement, at],
        )?;
        Ok(changed == 1)
    }
}
