//! Fraud case queries.

use super::FraudStore;
use crate::{
    case::{Case, CaseStatus},
    error::EngineResult,
};
use rusqlite::{params, OptionalExtension};

impl FraudStore {
    /// Insert or overwrite the stored state of a case.
    pub fn upsert_case(&self, case: &Case) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO fraud_case
                (case_id, account_id, status, priority, opened_at, resolved_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(case_id) DO UPDATE SET
                status = excluded.status,
                priority = excluded.priority,
                resolved_at = excluded.resolved_at,
                payload = excluded.payload",
            params![
                case.id,
                case.account_id,
                case.status.as_str(),
                case.priority.as_str(),
                case.opened_at.to_rfc3339(),
                case.resolved_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(case)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_case(&self, case_id: &str) -> EngineResult<Option<Case>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM fraud_case WHERE case_id = ?1",
                params![case_id],
                |r| r.get(0),
            )
            .optional()?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    pub fn case_ids_for_account(&self, account_id: &str) -> EngineResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT case_id FROM fraud_case WHERE account_id = ?1 ORDER BY case_id")?;
        let rows = stmt.query_map(params![account_id], |r| r.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for r in rows {
            ids.push(r?);
        }
        Ok(ids)
    }

    pub fn case_count_by_status(&self, status: CaseStatus) -> EngineResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM fraud_case WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }
}
