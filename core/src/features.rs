//! Feature extraction: transaction + account history -> normalized signals.
//!
//! extract() is a pure function of its inputs.
//! A feature that needs history which does not exist yet degrades to its
//! neutral (zero-risk) value; it never aborts scoring.

use crate::{
    config::FeatureConfig,
    error::{EngineError, EngineResult},
    history::AccountHistory,
    transaction::Transaction,
};
use chrono::{Datelike, Duration, Timelike};
use serde::{Deserialize, Serialize};

const AMOUNT_DEVIATION_WEIGHT: f64 = 0.50;
const CHANNEL_DEVIATION_WEIGHT: f64 = 0.25;
const COUNTERPARTY_DEVIATION_WEIGHT: f64 = 0.25;
/// A tenfold change from the average saturates the amount term.
const AMOUNT_DEVIATION_SATURATION: f64 = 10.0;
/// Unseen region inside a country the account already transacts from.
const KNOWN_COUNTRY_UNFAMILIARITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Velocity,
    Geographic,
    Temporal,
    Behavioral,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Velocity => "velocity",
            Self::Geographic => "geo_risk",
            Self::Temporal => "temporal_risk",
            Self::Behavioral => "behavioral_deviation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub amount: f64,
    pub amount_ratio: f64,
    /// Prior transactions of the account inside the velocity window.
    pub velocity: u32,
    pub geo_risk: f64,
    pub temporal_risk: f64,
    pub behavioral_deviation: f64,
    pub local_hour: u32,
    /// 0 = Monday.
    pub weekday: u32,
    /// Features that fell back to their neutral value.
    pub degraded: Vec<FeatureKind>,
}

impl FeatureSet {
    pub fn is_degraded(&self, kind: FeatureKind) -> bool {
        self.degraded.contains(&kind)
    }
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn extract(&self, txn: &Transaction, history: &AccountHistory) -> FeatureSet {
        let mut degraded = Vec::new();

        let amount = txn.amount.abs();
        let amount_ratio = amount / history.average_amount.max(self.config.amount_floor);

        let velocity = absorb(self.velocity(txn, history), FeatureKind::Velocity, &mut degraded);
        let unfamiliarity = absorb(self.unfamiliarity(txn, history), FeatureKind::Geographic, &mut degraded);
        let geo_risk = self.country_risk(txn).max(unfamiliarity);
        let temporal_risk = absorb(self.temporal_risk(txn, history), FeatureKind::Temporal, &mut degraded);
        let behavioral_deviation =
            absorb(self.behavioral_deviation(txn, history), FeatureKind::Behavioral, &mut degraded);

        if !degraded.is_empty() {
            log::debug!(
                "txn={} account={} neutral features: {:?}",
                txn.id,
                txn.account_id,
                degraded
            );
        }

        FeatureSet {
            amount,
            amount_ratio,
            velocity: velocity as u32,
            geo_risk,
            temporal_risk,
            behavioral_deviation,
            local_hour: txn.timestamp.hour(),
            weekday: txn.timestamp.weekday().num_days_from_monday(),
            degraded,
        }
    }

    fn velocity(&self, txn: &Transaction, history: &AccountHistory) -> EngineResult<f64> {
        if history.is_empty() {
            return Err(EngineError::InsufficientHistory {
                feature: FeatureKind::Velocity.as_str(),
            });
        }
        // None means the window reaches past the representable range: every
        // prior transaction in history is inside it.
        let window_start = Duration::try_minutes(self.config.velocity_window_minutes)
            .and_then(|window| txn.timestamp.checked_sub_signed(window));
        let count = history
            .recent_transactions
            .iter()
            .filter(|t| window_start.map_or(true, |start| t.timestamp > start) && t.timestamp <= txn.timestamp)
            .count();
        Ok(count as f64)
    }

    fn country_risk(&self, txn: &Transaction) -> f64 {
        let country = &txn.origin_location.country;
        if self
            .config
            .high_risk_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country))
        {
            1.0
        } else {
            0.0
        }
    }

    fn unfamiliarity(&self, txn: &Transaction, history: &AccountHistory) -> EngineResult<f64> {
        if history.typical_locations.is_empty() {
            return Err(EngineError::InsufficientHistory {
                feature: FeatureKind::Geographic.as_str(),
            });
        }
        let key = txn.origin_location.key();
        if history.typical_locations.contains(&key) {
            return Ok(0.0);
        }

        if let Some(origin) = txn.origin_location.coordinates {
            let nearest = history
                .recent_transactions
                .iter()
                .filter_map(|t| t.origin_location.coordinates)
                .map(|p| origin.distance_km(&p))
                .fold(None, |best: Option<f64>, d| Some(best.map_or(d, |b| b.min(d))));
            if let Some(distance) = nearest {
                return Ok((distance / self.config.distance_scale_km).min(1.0));
            }
        }

        if history.typical_locations.iter().any(|k| k.country == key.country) {
            Ok(KNOWN_COUNTRY_UNFAMILIARITY)
        } else {
            Ok(1.0)
        }
    }

    fn temporal_risk(&self, txn: &Transaction, history: &AccountHistory) -> EngineResult<f64> {
        if history.typical_hours.is_empty() {
            return Err(EngineError::InsufficientHistory {
                feature: FeatureKind::Temporal.as_str(),
            });
        }
        if history.typical_hours.contains(&txn.timestamp.hour()) {
            Ok(0.0)
        } else {
            Ok(1.0)
        }
    }

    fn behavioral_deviation(&self, txn: &Transaction, history: &AccountHistory) -> EngineResult<f64> {
        let n = history.len();
        if n == 0 || n < self.config.min_behavioral_history {
            return Err(EngineError::InsufficientHistory {
                feature: FeatureKind::Behavioral.as_str(),
            });
        }

        let average = history.average_amount.max(self.config.amount_floor);
        let amount = txn.amount.abs().max(0.01);
        let amount_term = ((amount / average).ln().abs() / AMOUNT_DEVIATION_SATURATION.ln()).min(1.0);

        let same_channel = history
            .recent_transactions
            .iter()
            .filter(|t| t.channel == txn.channel)
            .count();
        let same_counterparty = history
            .recent_transactions
            .iter()
            .filter(|t| t.counterparty == txn.counterparty)
            .count();
        let channel_term = 1.0 - same_channel as f64 / n as f64;
        let counterparty_term = 1.0 - same_counterparty as f64 / n as f64;

        let deviation = AMOUNT_DEVIATION_WEIGHT * amount_term
            + CHANNEL_DEVIATION_WEIGHT * channel_term
            + COUNTERPARTY_DEVIATION_WEIGHT * counterparty_term;
        Ok(deviation.clamp(0.0, 1.0))
    }
}

/// Substitute the neutral value for a feature that lacks history.
fn absorb(result: EngineResult<f64>, kind: FeatureKind, degraded: &mut Vec<FeatureKind>) -> f64 {
    match result {
        Ok(value) => value,
        Err(EngineError::InsufficientHistory { .. }) => {
            degraded.push(kind);
            0.0
        }
        Err(other) => {
            // Feature computations only ever report missing history.
            log::warn!("feature {} failed, using neutral value: {other}", kind.as_str());
            degraded.push(kind);
            0.0
        }
    }
}
