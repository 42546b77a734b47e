use super::GateStore;
use crate::{
    error::{GateError, GateResult},
    risk_rating_engine::{RiskRating, RiskRatingRecord, RiskTier},
    types::Timestamp,
};
use rusqlite::{params, OptionalExtension};

impl GateStore {
    pub fn insert_risk_rating(
        &self,
        customer_id: &str,
        rating: &RiskRating,
        at: Timestamp,
    ) -> GateResult<()> {
        self.conn.execute(
            "INSERT INTO customer_risk_rating (customer_id, score, rating, factors, assessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                customer_id,
                rating.score,
                rating.tier.as_str(),
                serde_json::to_string(&rating.factors)?,
                at,
            ],
        )?;
        Ok(())
    }

    /// Most recent rating; ties on time go to the later insert.
    pub fn latest_risk_rating(&self, customer_id: &str) -> GateResult<Option<RiskRatingRecord>> {
        let row: Option<(u32, String, String, Timestamp)> = self
            .conn
            .query_row(
                "SELECT score, rating, factors, assessed_at FROM customer_risk_rating
                 WHERE customer_id = ?1 ORDER BY assessed_at DESC, id DESC LIMIT 1",
                params![customer_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;

        let Some((score, tier, factors, assessed_at)) = row else {
            return Ok(None);
        };
        let tier = RiskTier::parse(&tier).ok_or_else(|| {
            GateError::Other(anyhow::anyhow!("unknown risk tier '{tier}' in store"))
        })?;
        Ok(Some(RiskRatingRecord {
            customer_id: customer_id.to_string(),
            rating: RiskRating {
                score,
                tier,
                factors: serde_json::from_str(&factors)?,
            },
            assessed_at,
        }))
    }
}
