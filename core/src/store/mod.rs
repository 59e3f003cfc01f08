//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine and case manager hand over values and events; they never
//! execute SQL and never wait on I/O.

use crate::{error::EngineResult, event::EventLogEntry};
use rusqlite::{params, Connection};

mod alert;
mod case;

pub struct FraudStore {
    conn: Connection,
}

impl FraudStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> EngineResult<i64> {
        self.conn.execute(
            "INSERT INTO event_log (subject_id, event_type, payload) VALUES (?1, ?2, ?3)",
            params![entry.subject_id, entry.event_type, entry.payload],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All events about one transaction, alert or case, oldest first.
    pub fn events_for_subject(&self, subject_id: &str) -> EngineResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, event_type, payload
             FROM event_log WHERE subject_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![subject_id], |row| {
            Ok(EventLogEntry {
                id: Some(row.get(0)?),
                subject_id: row.get(1)?,
                event_type: row.get(2)?,
                payload: row.get(3)?,
            })
        })?;
        let mut entries = Vec::new();
        for r in rows {
            entries.push(r?);
        }
        Ok(entries)
    }

    pub fn event_count(&self) -> EngineResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}
