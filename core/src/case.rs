//! Case lifecycle manager.
//!
//! TRANSITIONS (the only source of truth):
//!   new alert, no active case for the account within the merge window
//!       -> new Case (open) holding the alert
//!   new alert, active case for the account within the merge window
//!       -> alert attached, case status unchanged
//!   StartInvestigation            open -> investigating
//!   ResolveCase                   open | investigating -> resolved,
//!                                 only when every alert is resolved or dismissed
//!   resolved is terminal.
//!
//! A rejected command leaves every case and alert untouched.

use crate::{
    alert::{Alert, AlertStatus, Severity},
    command::InvestigatorCommand,
    error::{EngineError, EngineResult},
    event::EngineEvent,
    types::{AccountId, AlertId, CaseId, Timestamp},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    Investigating,
    Resolved,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    FraudConfirmed,
    FalsePositive,
    Unresolved,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FraudConfirmed => "fraud_confirmed",
            Self::FalsePositive => "false_positive",
            Self::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseNote {
    pub id: String,
    pub author: String,
    pub text: String,
    pub written_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub account_id: AccountId,
    /// Never empty once the case exists.
    pub alert_ids: BTreeSet<AlertId>,
    pub status: CaseStatus,
    pub resolution: Resolution,
    /// Highest severity among member alerts.
    pub priority: Severity,
    #[serde(default)]
    pub assignee: Option<String>,
    pub opened_at: Timestamp,
    pub last_alert_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub notes: Vec<CaseNote>,
}

/// Where an incoming alert ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseAssignment {
    pub case_id: CaseId,
    pub created: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseMetrics {
    pub open: usize,
    pub investigating: usize,
    pub resolved: usize,
    pub fraud_confirmed: usize,
    pub false_positive: usize,
    /// Resolved cases as a percentage of all cases.
    pub resolution_rate: f64,
    pub avg_resolution_hours: f64,
}

/// Active (open or in-progress) alerts by severity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertSummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total_active: usize,
    pub manual_review: usize,
}

pub struct CaseManager {
    merge_window: Duration,
    cases: BTreeMap<CaseId, Case>,
    alerts: BTreeMap<AlertId, Alert>,
    alert_case: BTreeMap<AlertId, CaseId>,
    next_case_seq: u64,
}

impl CaseManager {
    pub fn new(merge_window: Duration) -> Self {
        Self {
            merge_window,
            cases: BTreeMap::new(),
            alerts: BTreeMap::new(),
            alert_case: BTreeMap::new(),
            next_case_seq: 1,
        }
    }

    pub fn merge_window(&self) -> Duration {
        self.merge_window
    }

    pub fn get_case(&self, case_id: &str) -> Option<&Case> {
        self.cases.get(case_id)
    }

    pub fn get_alert(&self, alert_id: &str) -> Option<&Alert> {
        self.alerts.get(alert_id)
    }

    pub fn case_for_alert(&self, alert_id: &str) -> Option<&Case> {
        self.alert_case.get(alert_id).and_then(|id| self.cases.get(id))
    }

    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.cases.values()
    }

    pub fn cases_for_account<'a>(&'a self, account_id: &'a str) -> impl Iterator<Item = &'a Case> + 'a {
        self.cases.values().filter(move |c| c.account_id == account_id)
    }

    pub fn alerts_of<'a>(&'a self, case: &'a Case) -> impl Iterator<Item = &'a Alert> + 'a {
        case.alert_ids.iter().filter_map(move |id| self.alerts.get(id))
    }

    /// Route a freshly generated alert into a new or existing case.
    pub fn ingest_alert(&mut self, alert: Alert) -> EngineResult<(CaseAssignment, Vec<EngineEvent>)> {
        if let Some(case_id) = self.alert_case.get(&alert.id) {
            log::warn!("alert {} already routed to case {case_id}, ignoring", alert.id);
            return Ok((
                CaseAssignment {
                    case_id: case_id.clone(),
                    created: false,
                },
                Vec::new(),
            ));
        }

        let at = alert.created_at;
        let alert_id = alert.id.clone();
        let severity = alert.severity;

        let target = self
            .cases
            .values()
            .filter(|c| c.account_id == alert.account_id && c.status.is_active())
            .filter(|c| (at - c.last_alert_at).num_seconds().abs() <= self.merge_window.num_seconds())
            .max_by(|a, b| a.last_alert_at.cmp(&b.last_alert_at).then_with(|| b.id.cmp(&a.id)))
            .map(|c| c.id.clone());

        let (assignment, event) = match target {
            Some(case_id) => {
                let case = self
                    .cases
                    .get_mut(&case_id)
                    .ok_or_else(|| EngineError::UnknownCase { case_id: case_id.clone() })?;
                case.alert_ids.insert(alert_id.clone());
                case.priority = case.priority.max(severity);
                case.last_alert_at = case.last_alert_at.max(at);
                log::info!("alert {alert_id} attached to case {case_id}");
                (
                    CaseAssignment {
                        case_id: case_id.clone(),
                        created: false,
                    },
                    EngineEvent::AlertAttached {
                        at,
                        case_id,
                        alert_id: alert_id.clone(),
                    },
                )
            }
            None => {
                let case_id = format!("case-{:06}", self.next_case_seq);
                self.next_case_seq += 1;
                let case = Case {
                    id: case_id.clone(),
                    account_id: alert.account_id.clone(),
                    alert_ids: BTreeSet::from([alert_id.clone()]),
                    status: CaseStatus::Open,
                    resolution: Resolution::Unresolved,
                    priority: severity,
                    assignee: None,
                    opened_at: at,
                    last_alert_at: at,
                    resolved_at: None,
                    notes: Vec::new(),
                };
                log::info!(
                    "case {case_id} opened for account {} with alert {alert_id}",
                    case.account_id
                );
                let event = EngineEvent::CaseOpened {
                    at,
                    case_id: case_id.clone(),
                    account_id: case.account_id.clone(),
                    alert_id: alert_id.clone(),
                };
                self.cases.insert(case_id.clone(), case);
                (
                    CaseAssignment {
                        case_id,
                        created: true,
                    },
                    event,
                )
            }
        };

        self.alert_case.insert(alert_id.clone(), assignment.case_id.clone());
        self.alerts.insert(alert_id, alert);
        Ok((assignment, vec![event]))
    }

    /// Apply one investigator command at time `at`.
    pub fn apply(&mut self, command: InvestigatorCommand, at: Timestamp) -> EngineResult<Vec<EngineEvent>> {
        match command {
            InvestigatorCommand::AcknowledgeAlert { alert_id } => {
                let alert = self.alert_mut(&alert_id)?;
                let from = alert.acknowledge()?;
                Ok(vec![status_changed(at, alert, from)])
            }
            InvestigatorCommand::ResolveAlert {
                alert_id,
                confirmed_fraud,
            } => {
                let alert = self.alert_mut(&alert_id)?;
                let from = alert.resolve(confirmed_fraud, at)?;
                Ok(vec![status_changed(at, alert, from)])
            }
            InvestigatorCommand::DismissAlert { alert_id } => {
                let alert = self.alert_mut(&alert_id)?;
                let from = alert.dismiss(at)?;
                Ok(vec![status_changed(at, alert, from)])
            }
            InvestigatorCommand::StartInvestigation { case_id } => {
                let case = self.case_mut(&case_id)?;
                if case.status != CaseStatus::Open {
                    return Err(invalid_case_transition(case, CaseStatus::Investigating.as_str()));
                }
                case.status = CaseStatus::Investigating;
                log::info!("case {case_id} under investigation");
                Ok(vec![EngineEvent::InvestigationStarted { at, case_id }])
            }
            InvestigatorCommand::AssignCase { case_id, assignee } => {
                let case = self.case_mut(&case_id)?;
                if !case.status.is_active() {
                    return Err(invalid_case_transition(case, "assigned"));
                }
                let mut events = Vec::with_capacity(2);
                // Taking ownership of an open case starts the investigation.
                if case.status == CaseStatus::Open {
                    case.status = CaseStatus::Investigating;
                    events.push(EngineEvent::InvestigationStarted {
                        at,
                        case_id: case_id.clone(),
                    });
                }
                case.assignee = Some(assignee.clone());
                log::info!("case {case_id} assigned to {assignee}");
                events.push(EngineEvent::CaseAssigned { at, case_id, assignee });
                Ok(events)
            }
            InvestigatorCommand::AddCaseNote { case_id, author, text } => {
                let case = self.case_mut(&case_id)?;
                if !case.status.is_active() {
                    return Err(invalid_case_transition(case, "note"));
                }
                let note_id = uuid::Uuid::new_v4().to_string();
                case.notes.push(CaseNote {
                    id: note_id.clone(),
                    author: author.clone(),
                    text,
                    written_at: at,
                });
                Ok(vec![EngineEvent::CaseNoteAdded {
                    at,
                    case_id,
                    note_id,
                    author,
                }])
            }
            InvestigatorCommand::ResolveCase { case_id } => self.resolve_case(&case_id, at),
        }
    }

    fn resolve_case(&mut self, case_id: &str, at: Timestamp) -> EngineResult<Vec<EngineEvent>> {
        let case = self
            .cases
            .get(case_id)
            .ok_or_else(|| EngineError::UnknownCase { case_id: case_id.to_string() })?;
        if !case.status.is_active() {
            return Err(invalid_case_transition(case, CaseStatus::Resolved.as_str()));
        }

        let pending: Vec<AlertId> = case
            .alert_ids
            .iter()
            .filter(|id| self.alerts.get(*id).map_or(true, |a| !a.status.is_closed()))
            .cloned()
            .collect();
        if !pending.is_empty() {
            log::warn!("case {case_id} resolution rejected, pending alerts: {pending:?}");
            return Err(EngineError::PrematureResolution {
                case_id: case_id.to_string(),
                pending,
            });
        }

        let fraud = self.alerts_of(case).any(Alert::is_confirmed_fraud);
        let resolution = if fraud {
            Resolution::FraudConfirmed
        } else {
            Resolution::FalsePositive
        };

        let case = self.case_mut(case_id)?;
        case.status = CaseStatus::Resolved;
        case.resolution = resolution;
        case.resolved_at = Some(at);
        log::info!("case {case_id} resolved: {}", resolution.as_str());
        Ok(vec![EngineEvent::CaseResolved {
            at,
            case_id: case_id.to_string(),
            resolution,
        }])
    }

    fn alert_mut(&mut self, alert_id: &str) -> EngineResult<&mut Alert> {
        self.alerts
            .get_mut(alert_id)
            .ok_or_else(|| EngineError::UnknownAlert { alert_id: alert_id.to_string() })
    }

    fn case_mut(&mut self, case_id: &str) -> EngineResult<&mut Case> {
        self.cases
            .get_mut(case_id)
            .ok_or_else(|| EngineError::UnknownCase { case_id: case_id.to_string() })
    }

    pub fn metrics(&self) -> CaseMetrics {
        let mut m = CaseMetrics::default();
        let mut resolution_hours = Vec::new();
        for case in self.cases.values() {
            match case.status {
                CaseStatus::Open => m.open += 1,
                CaseStatus::Investigating => m.investigating += 1,
                CaseStatus::Resolved => m.resolved += 1,
            }
            match case.resolution {
                Resolution::FraudConfirmed => m.fraud_confirmed += 1,
                Resolution::FalsePositive => m.false_positive += 1,
                Resolution::Unresolved => {}
            }
            if let Some(resolved_at) = case.resolved_at {
                resolution_hours.push((resolved_at - case.opened_at).num_minutes() as f64 / 60.0);
            }
        }
        let total = self.cases.len();
        if total > 0 {
            m.resolution_rate = m.resolved as f64 / total as f64 * 100.0;
        }
        if !resolution_hours.is_empty() {
            m.avg_resolution_hours = resolution_hours.iter().sum::<f64>() / resolution_hours.len() as f64;
        }
        m
    }

    pub fn alert_summary(&self) -> AlertSummary {
        let mut s = AlertSummary::default();
        for alert in self.alerts.values().filter(|a| !a.status.is_closed()) {
            match alert.severity {
                Severity::Critical => s.critical += 1,
                Severity::High => s.high += 1,
                Severity::Medium => s.medium += 1,
                Severity::Low => s.low += 1,
            }
            s.total_active += 1;
            if alert.requires_manual_review {
                s.manual_review += 1;
            }
        }
        s
    }
}

fn status_changed(at: Timestamp, alert: &Alert, from: AlertStatus) -> EngineEvent {
    log::info!("alert {} {} -> {}", alert.id, from, alert.status);
    EngineEvent::AlertStatusChanged {
        at,
        alert_id: alert.id.clone(),
        from,
        to: alert.status,
    }
}

/// `to` names the target status, or the attempted action when the command
/// does not change status.
fn invalid_case_transition(case: &Case, to: &str) -> EngineError {
    EngineError::InvalidTransition {
        entity: "case",
        id: case.id.clone(),
        from: case.status.to_string(),
        to: to.to_string(),
    }
}
