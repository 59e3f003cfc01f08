use crate::types::{AlertId, CaseId};
use serde::{Deserialize, Serialize};

/// All investigator-issued commands.
/// The case manager's transition table is the only place they take effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum InvestigatorCommand {
    // ── Alerts ────────────────────────────────────
    AcknowledgeAlert {
        alert_id: AlertId,
    },
    ResolveAlert {
        alert_id: AlertId,
        confirmed_fraud: bool,
    },
    DismissAlert {
        alert_id: AlertId,
    },

    // ── Cases ─────────────────────────────────────
    StartInvestigation {
        case_id: CaseId,
    },
    AssignCase {
        case_id: CaseId,
        assignee: String,
    },
    AddCaseNote {
        case_id: CaseId,
        author: String,
        text: String,
    },
    ResolveCase {
        case_id: CaseId,
    },
}
