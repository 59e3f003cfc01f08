use crate::{
    aggregator::Thresholds,
    alert::SeverityCutoffs,
    error::{EngineError, EngineResult},
    rules::{HourWindow, RuleSet},
};
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// One leap year. Longer windows are rejected at load.
pub const MAX_VELOCITY_WINDOW_MINUTES: i64 = 366 * 24 * 60;
pub const MAX_MERGE_WINDOW_HOURS: i64 = 366 * 24;

// ── Feature extraction ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Lower bound for the average amount used as amount_ratio denominator.
    pub amount_floor: f64,
    pub velocity_window_minutes: i64,
    /// Maximum number of transactions kept per account.
    pub history_window: usize,
    /// Distance at which geographic unfamiliarity saturates to 1.0.
    pub distance_scale_km: f64,
    #[serde(default)]
    pub high_risk_countries: Vec<String>,
    /// Prior transactions required before behavioral deviation is computed.
    pub min_behavioral_history: usize,
}

// ── Disposition & severity ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub flag_threshold: f64,
    pub block_threshold: f64,
    /// Flagged scores at or above this are medium severity, otherwise low.
    pub medium_cutoff: f64,
    /// Blocked scores at or above this are critical severity, otherwise high.
    pub critical_cutoff: f64,
}

// ── Case lifecycle ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseConfig {
    pub merge_window_hours: i64,
}

// ── Rules ──────────────────────────────────────────────────────────

/// A rule as it appears in rules.json. Loosely typed on purpose:
/// RuleSet::from_configs resolves it into a typed Rule at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub weight: f64,
    /// Contribution when the rule triggers, before weighting.
    pub score: f64,
    /// Amount rules only: "absolute" or "ratio".
    #[serde(default)]
    pub measure: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Temporal rules only.
    #[serde(default)]
    pub off_hours: Option<HourWindow>,
    /// Temporal rules only: also trigger on Saturday and Sunday.
    #[serde(default)]
    pub weekend: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct EngineSettingsFile {
    features: FeatureConfig,
    thresholds: ThresholdConfig,
    cases: CaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct RulesFile {
    rules: Vec<RuleConfig>,
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub features: FeatureConfig,
    pub thresholds: ThresholdConfig,
    pub cases: CaseConfig,
    pub rules: Vec<RuleConfig>,
}

impl EngineConfig {
    /// Load from the data/ directory.
    /// In tests, use EngineConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let settings_path = format!("{data_dir}/engine_config.json");
        let settings_content = std::fs::read_to_string(&settings_path)
            .with_context(|| format!("Cannot read {settings_path}"))?;
        let settings: EngineSettingsFile = serde_json::from_str(&settings_content)
            .with_context(|| format!("Cannot parse {settings_path}"))?;

        let rules_path = format!("{data_dir}/rules.json");
        let rules_content = std::fs::read_to_string(&rules_path)
            .with_context(|| format!("Cannot read {rules_path}"))?;
        let rules_file: RulesFile = serde_json::from_str(&rules_content)
            .with_context(|| format!("Cannot parse {rules_path}"))?;

        let config = Self {
            features: settings.features,
            thresholds: settings.thresholds,
            cases: settings.cases,
            rules: rules_file.rules,
        };
        config.validate()?;
        log::info!(
            "Loaded engine config from {data_dir}: {} rules",
            config.rules.len()
        );
        Ok(config)
    }

    /// Check every invariant that must hold before the config may score.
    /// Scoring never re-validates, so nothing invalid can be observed mid-pipeline.
    pub fn validate(&self) -> EngineResult<()> {
        self.validate_features()?;
        self.thresholds()?;
        self.severity_cutoffs()?;
        self.merge_window()?;
        RuleSet::from_configs(&self.rules)?;
        Ok(())
    }

    pub fn thresholds(&self) -> EngineResult<Thresholds> {
        Thresholds::new(self.thresholds.flag_threshold, self.thresholds.block_threshold)
    }

    pub fn severity_cutoffs(&self) -> EngineResult<SeverityCutoffs> {
        SeverityCutoffs::new(&self.thresholds()?, self.thresholds.medium_cutoff, self.thresholds.critical_cutoff)
    }

    pub fn merge_window(&self) -> EngineResult<chrono::Duration> {
        let hours = self.cases.merge_window_hours;
        if !(0..=MAX_MERGE_WINDOW_HOURS).contains(&hours) {
            return Err(EngineError::invalid_config(format!(
                "merge_window_hours must be within 0..={MAX_MERGE_WINDOW_HOURS}, got {hours}"
            )));
        }
        chrono::Duration::try_hours(hours)
            .ok_or_else(|| EngineError::invalid_config(format!("merge_window_hours out of range: {hours}")))
    }

    fn validate_features(&self) -> EngineResult<()> {
        let f = &self.features;
        if !(f.amount_floor.is_finite() && f.amount_floor > 0.0) {
            return Err(EngineError::invalid_config(format!(
                "amount_floor must be a positive number, got {}",
                f.amount_floor
            )));
        }
        if !(1..=MAX_VELOCITY_WINDOW_MINUTES).contains(&f.velocity_window_minutes) {
            return Err(EngineError::invalid_config(format!(
                "velocity_window_minutes must be within 1..={MAX_VELOCITY_WINDOW_MINUTES}, got {}",
                f.velocity_window_minutes
            )));
        }
        if f.history_window == 0 {
            return Err(EngineError::invalid_config("history_window must be at least 1"));
        }
        if !(f.distance_scale_km.is_finite() && f.distance_scale_km > 0.0) {
            return Err(EngineError::invalid_config(format!(
                "distance_scale_km must be a positive number, got {}",
                f.distance_scale_km
            )));
        }
        Ok(())
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            features: FeatureConfig {
                amount_floor: 100.0,
                velocity_window_minutes: 60,
                history_window: 100,
                distance_scale_km: 5000.0,
                high_risk_countries: vec!["XX".into(), "YY".into()],
                min_behavioral_history: 3,
            },
            thresholds: ThresholdConfig {
                flag_threshold: 50.0,
                block_threshold: 80.0,
                medium_cutoff: 65.0,
                critical_cutoff: 85.0,
            },
            cases: CaseConfig {
                merge_window_hours: 24,
            },
            rules: vec![
                RuleConfig {
                    id: "R001".into(),
                    name: "Amount far above account average".into(),
                    category: "amount".into(),
                    enabled: true,
                    weight: 1.0,
                    score: 85.0,
                    measure: Some("ratio".into()),
                    threshold: Some(5.0),
                    off_hours: None,
                    weekend: false,
                },
                RuleConfig {
                    id: "R002".into(),
                    name: "Burst of transactions".into(),
                    category: "velocity".into(),
                    enabled: true,
                    weight: 1.0,
                    score: 30.0,
                    measure: None,
                    threshold: Some(5.0),
                    off_hours: None,
                    weekend: false,
                },
                RuleConfig {
                    id: "R003".into(),
                    name: "Unfamiliar or high-risk location".into(),
                    category: "geographic".into(),
                    enabled: true,
                    weight: 1.0,
                    score: 25.0,
                    measure: None,
                    threshold: Some(0.5),
                    off_hours: None,
                    weekend: false,
                },
                RuleConfig {
                    id: "R004".into(),
                    name: "Activity outside usual hours".into(),
                    category: "temporal".into(),
                    enabled: true,
                    weight: 0.5,
                    score: 20.0,
                    measure: None,
                    threshold: None,
                    off_hours: None,
                    weekend: false,
                },
                RuleConfig {
                    id: "R005".into(),
                    name: "Deviation from behavioral profile".into(),
                    category: "behavioral".into(),
                    enabled: true,
                    weight: 1.0,
                    score: 20.0,
                    measure: None,
                    threshold: Some(0.6),
                    off_hours: None,
                    weekend: false,
                },
            ],
        }
    }
}
