//! Score result and alert queries.

use super::FraudStore;
use crate::{
    aggregator::ScoreResult,
    alert::{Alert, AlertStatus},
    error::{EngineError, EngineResult},
};
use rusqlite::{params, OptionalExtension};

impl FraudStore {
    /// Insert a score result. Re-inserting the same transaction replaces it.
    pub fn insert_score_result(&self, score: &ScoreResult) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO score_result
                (transaction_id, account_id, risk_score, disposition, computed_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                score.transaction_id,
                score.account_id,
                score.risk_score,
                score.disposition.as_str(),
                score.computed_at.to_rfc3339(),
                serde_json::to_string(score)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_score_result(&self, transaction_id: &str) -> EngineResult<Option<ScoreResult>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM score_result WHERE transaction_id = ?1",
                params![transaction_id],
                |r| r.get(0),
            )
            .optional()?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    pub fn score_result_count(&self) -> EngineResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM score_result", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Insert a new alert. The score result it cites must already be stored.
    pub fn insert_alert(&self, alert: &Alert) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO alert
                (alert_id, transaction_id, account_id, severity, status, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                alert.id,
                alert.transaction_id,
                alert.account_id,
                alert.severity.as_str(),
                alert.status.as_str(),
                alert.created_at.to_rfc3339(),
                serde_json::to_string(alert)?,
            ],
        )?;
        Ok(())
    }

    /// Persist a status change. Evidence is immutable and never rewritten
    /// separately; the payload carries the alert as it now stands.
    pub fn update_alert(&self, alert: &Alert) -> EngineResult<()> {
        let changed = self.conn.execute(
            "UPDATE alert SET status = ?1, payload = ?2 WHERE alert_id = ?3",
            params![alert.status.as_str(), serde_json::to_string(alert)?, alert.id],
        )?;
        if changed == 0 {
            return Err(EngineError::UnknownAlert {
                alert_id: alert.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_alert(&self, alert_id: &str) -> EngineResult<Option<Alert>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM alert WHERE alert_id = ?1",
                params![alert_id],
                |r| r.get(0),
            )
            .optional()?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    pub fn alert_count_by_status(&self, status: AlertStatus) -> EngineResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM alert WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }
}
