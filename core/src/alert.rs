//! Alert generation and the per-alert status machine.
//!
//! An Alert is raised iff the disposition is not pass. Its evidence is a
//! snapshot of the ScoreResult and is never modified after creation.
//! Status changes come from investigators, through the case manager.

use crate::{
    aggregator::{Disposition, ScoreResult, Thresholds},
    error::{EngineError, EngineResult},
    rules::RuleCategory,
    types::{AccountId, AlertId, Timestamp, TransactionId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    InProgress,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }

    /// Resolved and dismissed alerts no longer block case resolution.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Investigator's conclusion, recorded when an alert is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    ConfirmedFraud,
    FalsePositive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub severity: Severity,
    pub status: AlertStatus,
    pub created_at: Timestamp,
    pub evidence: ScoreResult,
    pub recommendations: Vec<String>,
    /// High severity or at least two triggered rules.
    #[serde(default)]
    pub requires_manual_review: bool,
    pub verdict: Option<Verdict>,
    pub closed_at: Option<Timestamp>,
}

impl Alert {
    pub fn is_confirmed_fraud(&self) -> bool {
        self.verdict == Some(Verdict::ConfirmedFraud)
    }

    /// open -> in_progress
    pub fn acknowledge(&mut self) -> EngineResult<AlertStatus> {
        self.transition(&[AlertStatus::Open], AlertStatus::InProgress)
    }

    /// open | in_progress -> resolved
    pub fn resolve(&mut self, confirmed_fraud: bool, at: Timestamp) -> EngineResult<AlertStatus> {
        let from = self.transition(&[AlertStatus::Open, AlertStatus::InProgress], AlertStatus::Resolved)?;
        self.verdict = Some(if confirmed_fraud {
            Verdict::ConfirmedFraud
        } else {
            Verdict::FalsePositive
        });
        self.closed_at = Some(at);
        Ok(from)
    }

    /// open | in_progress -> dismissed
    pub fn dismiss(&mut self, at: Timestamp) -> EngineResult<AlertStatus> {
        let from = self.transition(&[AlertStatus::Open, AlertStatus::InProgress], AlertStatus::Dismissed)?;
        self.verdict = Some(Verdict::FalsePositive);
        self.closed_at = Some(at);
        Ok(from)
    }

    fn transition(&mut self, allowed_from: &[AlertStatus], to: AlertStatus) -> EngineResult<AlertStatus> {
        let from = self.status;
        if !allowed_from.contains(&from) {
            return Err(EngineError::InvalidTransition {
                entity: "alert",
                id: self.id.clone(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(from)
    }
}

/// Secondary cutoffs splitting each non-pass disposition into two severities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityCutoffs {
    medium_cutoff: f64,
    critical_cutoff: f64,
}

impl SeverityCutoffs {
    /// Requires flag_threshold <= medium_cutoff <= block_threshold <= critical_cutoff <= 100.
    pub fn new(thresholds: &Thresholds, medium_cutoff: f64, critical_cutoff: f64) -> EngineResult<Self> {
        let ordered = thresholds.flag_threshold() <= medium_cutoff
            && medium_cutoff <= thresholds.block_threshold()
            && thresholds.block_threshold() <= critical_cutoff
            && critical_cutoff <= 100.0;
        if !ordered {
            return Err(EngineError::invalid_config(format!(
                "severity cutoffs out of order: flag={} medium={} block={} critical={}",
                thresholds.flag_threshold(),
                medium_cutoff,
                thresholds.block_threshold(),
                critical_cutoff
            )));
        }
        Ok(Self {
            medium_cutoff,
            critical_cutoff,
        })
    }

    pub fn severity(&self, disposition: Disposition, risk_score: f64) -> Option<Severity> {
        match disposition {
            Disposition::Pass => None,
            Disposition::Flag if risk_score >= self.medium_cutoff => Some(Severity::Medium),
            Disposition::Flag => Some(Severity::Low),
            Disposition::Block if risk_score >= self.critical_cutoff => Some(Severity::Critical),
            Disposition::Block => Some(Severity::High),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertGenerator {
    cutoffs: SeverityCutoffs,
}

impl AlertGenerator {
    pub fn new(cutoffs: SeverityCutoffs) -> Self {
        Self { cutoffs }
    }

    /// Build an Alert for a flagged or blocked result. No side effects:
    /// persistence and notification belong to whoever receives the Alert.
    pub fn maybe_generate(&self, score: &ScoreResult) -> Option<Alert> {
        let severity = self.cutoffs.severity(score.disposition, score.risk_score)?;
        Some(Alert {
            id: format!("alert-{}", score.transaction_id),
            transaction_id: score.transaction_id.clone(),
            account_id: score.account_id.clone(),
            severity,
            status: AlertStatus::Open,
            created_at: score.computed_at,
            evidence: score.clone(),
            recommendations: recommendations(score),
            requires_manual_review: severity >= Severity::High || score.contributing_outcomes.len() >= 2,
            verdict: None,
            closed_at: None,
        })
    }
}

/// Actionable next steps for an investigator, by score band and by the
/// categories that triggered.
pub fn recommendations(score: &ScoreResult) -> Vec<String> {
    let mut out = Vec::new();
    let band = if score.risk_score >= 80.0 {
        ["Block transaction and investigate immediately", "Contact customer to verify transaction"]
    } else if score.risk_score >= 60.0 {
        ["Hold transaction for manual review", "Investigate the account's recent activity"]
    } else if score.risk_score >= 40.0 {
        ["Monitor account for additional suspicious activity", "Review transaction against historical pattern"]
    } else {
        ["Transaction appears normal", "Continue monitoring"]
    };
    out.extend(band.iter().map(|s| s.to_string()));

    let categories: BTreeSet<RuleCategory> = score.contributing_outcomes.iter().map(|o| o.category).collect();
    for category in categories {
        let hint = match category {
            RuleCategory::Amount => "Verify source of funds for large transaction",
            RuleCategory::Velocity => "Apply velocity controls to this account",
            RuleCategory::Geographic => "Verify the customer's current location",
            RuleCategory::Temporal => "Review off-hours activity on the account",
            RuleCategory::Behavioral => "Confirm the change in spending behavior with the customer",
        };
        out.push(hint.to_string());
    }
    out
}
