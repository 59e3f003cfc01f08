//! Engine events: the audit trail handed to persistence.
//!
//! RULE: Every state change the engine or case manager makes is described
//! by exactly one EngineEvent. Collaborators persist and forward these;
//! they never inspect engine internals.

use crate::{
    aggregator::Disposition,
    alert::{AlertStatus, Severity},
    case::Resolution,
    types::{AccountId, AlertId, CaseId, Timestamp, TransactionId},
};
use serde::{Deserialize, Serialize};

/// Variants are appended only, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    // ── Scoring ────────────────────────────────────
    TransactionScored {
        at: Timestamp,
        transaction_id: TransactionId,
        account_id: AccountId,
        risk_score: f64,
        disposition: Disposition,
    },
    AlertRaised {
        at: Timestamp,
        alert_id: AlertId,
        transaction_id: TransactionId,
        account_id: AccountId,
        severity: Severity,
    },
    ConfigReloaded {
        rule_count: usize,
        enabled_rules: usize,
    },

    // ── Case lifecycle ─────────────────────────────
    CaseOpened {
        at: Timestamp,
        case_id: CaseId,
        account_id: AccountId,
        alert_id: AlertId,
    },
    AlertAttached {
        at: Timestamp,
        case_id: CaseId,
        alert_id: AlertId,
    },
    AlertStatusChanged {
        at: Timestamp,
        alert_id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
    },
    InvestigationStarted {
        at: Timestamp,
        case_id: CaseId,
    },
    CaseAssigned {
        at: Timestamp,
        case_id: CaseId,
        assignee: String,
    },
    CaseNoteAdded {
        at: Timestamp,
        case_id: CaseId,
        note_id: String,
        author: String,
    },
    CaseResolved {
        at: Timestamp,
        case_id: CaseId,
        resolution: Resolution,
    },
}

impl EngineEvent {
    /// Stable name used for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TransactionScored { .. }    => "transaction_scored",
            Self::AlertRaised { .. }          => "alert_raised",
            Self::ConfigReloaded { .. }       => "config_reloaded",
            Self::CaseOpened { .. }           => "case_opened",
            Self::AlertAttached { .. }        => "alert_attached",
            Self::AlertStatusChanged { .. }   => "alert_status_changed",
            Self::InvestigationStarted { .. } => "investigation_started",
            Self::CaseAssigned { .. }         => "case_assigned",
            Self::CaseNoteAdded { .. }        => "case_note_added",
            Self::CaseResolved { .. }         => "case_resolved",
        }
    }

    /// The entity the event is about, used to index the log.
    pub fn subject_id(&self) -> &str {
        match self {
            Self::TransactionScored { transaction_id, .. } => transaction_id.as_str(),
            Self::AlertRaised { alert_id, .. }             => alert_id.as_str(),
            Self::ConfigReloaded { .. }                    => "engine",
            Self::CaseOpened { case_id, .. }               => case_id.as_str(),
            Self::AlertAttached { case_id, .. }            => case_id.as_str(),
            Self::AlertStatusChanged { alert_id, .. }      => alert_id.as_str(),
            Self::InvestigationStarted { case_id, .. }     => case_id.as_str(),
            Self::CaseAssigned { case_id, .. }             => case_id.as_str(),
            Self::CaseNoteAdded { case_id, .. }            => case_id.as_str(),
            Self::CaseResolved { case_id, .. }             => case_id.as_str(),
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub subject_id: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized EngineEvent
}

impl EventLogEntry {
    pub fn from_event(event: &EngineEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            subject_id: event.subject_id().to_string(),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
        })
    }
}
