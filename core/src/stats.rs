//! Per-rule trigger statistics and investigator feedback.

use crate::{aggregator::ScoreResult, alert::{Alert, Verdict}, types::RuleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleStats {
    pub triggers: u64,
    pub true_positives: u64,
    pub false_positives: u64,
}

impl RuleStats {
    /// True positives as a percentage of all triggers.
    pub fn accuracy(&self) -> f64 {
        if self.triggers == 0 {
            return 0.0;
        }
        self.true_positives as f64 / self.triggers as f64 * 100.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleStatsBook {
    rules: BTreeMap<RuleId, RuleStats>,
}

impl RuleStatsBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_score(&mut self, score: &ScoreResult) {
        for rule_id in score.triggered_rule_ids() {
            self.rules.entry(rule_id.to_string()).or_default().triggers += 1;
        }
    }

    /// Credit every rule in the alert's evidence with the investigator's verdict.
    /// Alerts without a verdict are ignored.
    pub fn record_verdict(&mut self, alert: &Alert) {
        let Some(verdict) = alert.verdict else {
            return;
        };
        for rule_id in alert.evidence.triggered_rule_ids() {
            let stats = self.rules.entry(rule_id.to_string()).or_default();
            match verdict {
                Verdict::ConfirmedFraud => stats.true_positives += 1,
                Verdict::FalsePositive => stats.false_positives += 1,
            }
        }
    }

    pub fn get(&self, rule_id: &str) -> Option<&RuleStats> {
        self.rules.get(rule_id)
    }

    pub fn snapshot(&self) -> BTreeMap<RuleId, RuleStats> {
        self.rules.clone()
    }
}
