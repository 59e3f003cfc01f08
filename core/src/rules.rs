//! Rule model and evaluation.
//!
//! Rules arrive as loosely typed RuleConfig records and are resolved once,
//! at load time, into the closed RuleKind enum. Evaluation is a plain match:
//! each category reads exactly one feature.

use crate::{
    config::RuleConfig,
    error::{EngineError, EngineResult},
    features::FeatureSet,
    types::RuleId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Weight per rule id, as handed to the aggregator.
pub type RuleWeights = BTreeMap<RuleId, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Amount,
    Velocity,
    Geographic,
    Temporal,
    Behavioral,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amount => "amount",
            Self::Velocity => "velocity",
            Self::Geographic => "geographic",
            Self::Temporal => "temporal",
            Self::Behavioral => "behavioral",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "amount" => Some(Self::Amount),
            "velocity" => Some(Self::Velocity),
            "geographic" => Some(Self::Geographic),
            "temporal" => Some(Self::Temporal),
            "behavioral" => Some(Self::Behavioral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountMeasure {
    Absolute,
    Ratio,
}

/// Inclusive hour range in local time. Wraps over midnight when start > end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

impl HourWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start > self.end {
            hour >= self.start || hour <= self.end
        } else {
            hour >= self.start && hour <= self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum RuleKind {
    Amount { measure: AmountMeasure, threshold: f64 },
    Velocity { max_count: u32 },
    Geographic { min_risk: f64 },
    Temporal { off_hours: Option<HourWindow>, weekend: bool },
    Behavioral { max_deviation: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub enabled: bool,
    pub weight: f64,
    /// Contribution when triggered, before weighting.
    pub score: f64,
    pub kind: RuleKind,
}

impl Rule {
    pub fn category(&self) -> RuleCategory {
        match self.kind {
            RuleKind::Amount { .. } => RuleCategory::Amount,
            RuleKind::Velocity { .. } => RuleCategory::Velocity,
            RuleKind::Geographic { .. } => RuleCategory::Geographic,
            RuleKind::Temporal { .. } => RuleCategory::Temporal,
            RuleKind::Behavioral { .. } => RuleCategory::Behavioral,
        }
    }

    /// Resolve a raw config record into a typed rule.
    pub fn from_config(raw: &RuleConfig) -> EngineResult<Self> {
        let fail = |reason: String| EngineError::invalid_config(format!("rule '{}': {reason}", raw.id));

        if raw.id.trim().is_empty() {
            return Err(EngineError::invalid_config("rule id must not be empty"));
        }
        if !(raw.weight.is_finite() && raw.weight >= 0.0) {
            return Err(fail(format!("weight must be a non-negative number, got {}", raw.weight)));
        }
        if !(raw.score.is_finite() && (0.0..=100.0).contains(&raw.score)) {
            return Err(fail(format!("score must lie in [0, 100], got {}", raw.score)));
        }

        let category = RuleCategory::parse(&raw.category)
            .ok_or_else(|| fail(format!("unknown category '{}'", raw.category)))?;
        let threshold = || -> EngineResult<f64> {
            match raw.threshold {
                Some(t) if t.is_finite() && t >= 0.0 => Ok(t),
                Some(t) => Err(fail(format!("threshold must be a non-negative number, got {t}"))),
                None => Err(fail(format!("{} rules require a threshold", category.as_str()))),
            }
        };

        let kind = match category {
            RuleCategory::Amount => {
                let measure = match raw.measure.as_deref().unwrap_or("absolute") {
                    "absolute" => AmountMeasure::Absolute,
                    "ratio" => AmountMeasure::Ratio,
                    other => return Err(fail(format!("unknown amount measure '{other}'"))),
                };
                RuleKind::Amount {
                    measure,
                    threshold: threshold()?,
                }
            }
            RuleCategory::Velocity => RuleKind::Velocity {
                max_count: threshold()?.floor() as u32,
            },
            RuleCategory::Geographic => {
                let min_risk = threshold()?;
                if min_risk > 1.0 {
                    return Err(fail(format!("geographic threshold must lie in [0, 1], got {min_risk}")));
                }
                RuleKind::Geographic { min_risk }
            }
            RuleCategory::Temporal => {
                if let Some(window) = raw.off_hours {
                    if window.start > 23 || window.end > 23 {
                        return Err(fail(format!(
                            "off_hours must use hours 0-23, got {}-{}",
                            window.start, window.end
                        )));
                    }
                }
                RuleKind::Temporal {
                    off_hours: raw.off_hours,
                    weekend: raw.weekend,
                }
            }
            RuleCategory::Behavioral => {
                let max_deviation = threshold()?;
                if max_deviation > 1.0 {
                    return Err(fail(format!(
                        "behavioral threshold must lie in [0, 1], got {max_deviation}"
                    )));
                }
                RuleKind::Behavioral { max_deviation }
            }
        };

        Ok(Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            enabled: raw.enabled,
            weight: raw.weight,
            score: raw.score,
            kind,
        })
    }
}

/// Ephemeral result of applying one rule to one feature set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    pub category: RuleCategory,
    pub triggered: bool,
    pub contribution: f64,
    pub explanation: String,
}

pub fn evaluate(rule: &Rule, features: &FeatureSet) -> RuleOutcome {
    let category = rule.category();
    if !rule.enabled {
        return RuleOutcome {
            rule_id: rule.id.clone(),
            category,
            triggered: false,
            contribution: 0.0,
            explanation: format!("{}: rule disabled", rule.name),
        };
    }

    let (triggered, explanation) = match &rule.kind {
        RuleKind::Amount {
            measure: AmountMeasure::Absolute,
            threshold,
        } => (
            features.amount > *threshold,
            format!("amount {:.2} vs threshold {:.2}", features.amount, threshold),
        ),
        RuleKind::Amount {
            measure: AmountMeasure::Ratio,
            threshold,
        } => (
            features.amount_ratio > *threshold,
            format!(
                "amount is {:.1}x the account average (threshold {:.1}x)",
                features.amount_ratio, threshold
            ),
        ),
        RuleKind::Velocity { max_count } => (
            features.velocity > *max_count,
            format!(
                "{} prior transactions in velocity window (max {})",
                features.velocity, max_count
            ),
        ),
        RuleKind::Geographic { min_risk } => (
            features.geo_risk > *min_risk,
            format!("geo risk {:.2} vs threshold {:.2}", features.geo_risk, min_risk),
        ),
        RuleKind::Temporal { off_hours, weekend } => {
            let mut reasons = Vec::new();
            if features.temporal_risk > 0.0 {
                reasons.push("outside usual hours");
            }
            if off_hours.map_or(false, |w| w.contains(features.local_hour)) {
                reasons.push("inside off-hours window");
            }
            // weekday counts from Monday = 0.
            if *weekend && features.weekday >= 5 {
                reasons.push("on a weekend");
            }
            let detail = if reasons.is_empty() {
                "within usual hours".to_string()
            } else {
                reasons.join(", ")
            };
            (
                !reasons.is_empty(),
                format!("local hour {:02}: {detail}", features.local_hour),
            )
        }
        RuleKind::Behavioral { max_deviation } => (
            features.behavioral_deviation > *max_deviation,
            format!(
                "behavioral deviation {:.2} vs threshold {:.2}",
                features.behavioral_deviation, max_deviation
            ),
        ),
    };

    RuleOutcome {
        rule_id: rule.id.clone(),
        category,
        triggered,
        contribution: if triggered { rule.score } else { 0.0 },
        explanation: format!("{}: {explanation}", rule.name),
    }
}

/// Validated, immutable rule set ordered by rule id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn from_configs(configs: &[RuleConfig]) -> EngineResult<Self> {
        let mut seen = BTreeSet::new();
        let mut rules = Vec::with_capacity(configs.len());
        for raw in configs {
            if !seen.insert(raw.id.clone()) {
                return Err(EngineError::invalid_config(format!("duplicate rule id '{}'", raw.id)));
            }
            rules.push(Rule::from_config(raw)?);
        }
        Ok(Self::new(rules))
    }

    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Self { rules }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }

    pub fn get(&self, rule_id: &str) -> Option<&Rule> {
        self.rules
            .binary_search_by(|r| r.id.as_str().cmp(rule_id))
            .ok()
            .map(|i| &self.rules[i])
    }

    pub fn weights(&self) -> RuleWeights {
        self.rules.iter().map(|r| (r.id.clone(), r.weight)).collect()
    }

    /// One outcome per rule, in rule-id order.
    pub fn evaluate_all(&self, features: &FeatureSet) -> Vec<RuleOutcome> {
        self.rules.iter().map(|rule| evaluate(rule, features)).collect()
    }
}
