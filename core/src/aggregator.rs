//! Risk aggregation, the single place numeric combination lives.
//!
//! risk_score = clamp(sum of contribution x weight over triggered outcomes, 0, 100)
//! Disposition is a pure function of risk_score. Ties at a threshold
//! resolve to the more severe disposition.

use crate::{
    error::{EngineError, EngineResult},
    rules::{RuleOutcome, RuleWeights},
    transaction::Transaction,
    types::{AccountId, Timestamp, TransactionId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_RISK_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Pass,
    Flag,
    Block,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Flag => "flag",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated disposition cutoffs: 0 < flag_threshold < block_threshold <= 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    flag_threshold: f64,
    block_threshold: f64,
}

impl Thresholds {
    pub fn new(flag_threshold: f64, block_threshold: f64) -> EngineResult<Self> {
        if !(flag_threshold.is_finite() && block_threshold.is_finite()) {
            return Err(EngineError::invalid_config("disposition thresholds must be finite"));
        }
        if flag_threshold <= 0.0 || block_threshold > MAX_RISK_SCORE {
            return Err(EngineError::invalid_config(format!(
                "thresholds must lie in (0, 100], got flag={flag_threshold} block={block_threshold}"
            )));
        }
        if block_threshold <= flag_threshold {
            return Err(EngineError::invalid_config(format!(
                "block_threshold ({block_threshold}) must exceed flag_threshold ({flag_threshold})"
            )));
        }
        Ok(Self {
            flag_threshold,
            block_threshold,
        })
    }

    pub fn flag_threshold(&self) -> f64 {
        self.flag_threshold
    }

    pub fn block_threshold(&self) -> f64 {
        self.block_threshold
    }

    pub fn disposition(&self, risk_score: f64) -> Disposition {
        if risk_score >= self.block_threshold {
            Disposition::Block
        } else if risk_score >= self.flag_threshold {
            Disposition::Flag
        } else {
            Disposition::Pass
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub risk_score: f64,
    pub disposition: Disposition,
    /// Triggered outcomes only, in rule-id order.
    pub contributing_outcomes: Vec<RuleOutcome>,
    pub computed_at: Timestamp,
}

impl ScoreResult {
    pub fn triggered_rule_ids(&self) -> impl Iterator<Item = &str> {
        self.contributing_outcomes.iter().map(|o| o.rule_id.as_str())
    }
}

/// Weighted, clamped sum over triggered outcomes.
/// Outcomes for rules without a weight contribute nothing.
pub fn combine(outcomes: &[RuleOutcome], weights: &RuleWeights) -> f64 {
    let raw: f64 = outcomes
        .iter()
        .filter(|o| o.triggered)
        .map(|o| o.contribution * weights.get(&o.rule_id).copied().unwrap_or(0.0))
        .sum();
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, MAX_RISK_SCORE)
}

#[derive(Debug, Clone)]
pub struct RiskAggregator {
    thresholds: Thresholds,
}

impl RiskAggregator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn aggregate(
        &self,
        txn: &Transaction,
        outcomes: Vec<RuleOutcome>,
        weights: &RuleWeights,
    ) -> ScoreResult {
        let risk_score = combine(&outcomes, weights);
        let mut contributing: Vec<RuleOutcome> = outcomes.into_iter().filter(|o| o.triggered).collect();
        contributing.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

        ScoreResult {
            transaction_id: txn.id.clone(),
            account_id: txn.account_id.clone(),
            risk_score,
            disposition: self.thresholds.disposition(risk_score),
            contributing_outcomes: contributing,
            computed_at: txn.timestamp,
        }
    }
}
