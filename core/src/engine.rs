//! The scoring engine: features -> rules -> aggregate -> alert.
//!
//! RULES:
//!   - The pipeline order is fixed: extract, evaluate, aggregate, alert.
//!   - A scoring call loads exactly one policy snapshot. Reload swaps the
//!     whole snapshot atomically; no call ever sees half a rule set.
//!   - Same-account transactions are serialized on the account lock, held
//!     from extraction until the history update.
//!   - A transaction id already in the account's window is rejected before
//!     any state changes.
//!   - No I/O. Persistence consumes the returned events.

use crate::{
    aggregator::{RiskAggregator, ScoreResult},
    alert::{Alert, AlertGenerator},
    config::EngineConfig,
    error::{EngineError, EngineResult},
    event::EngineEvent,
    features::{FeatureExtractor, FeatureSet},
    history::{AccountHistory, HistoryStore},
    rules::{RuleSet, RuleWeights},
    stats::{RuleStats, RuleStatsBook},
    transaction::Transaction,
    types::RuleId,
};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything one scoring call needs, validated and immutable.
pub struct ScoringPolicy {
    extractor: FeatureExtractor,
    rules: RuleSet,
    weights: RuleWeights,
    aggregator: RiskAggregator,
    alerts: AlertGenerator,
}

impl ScoringPolicy {
    pub fn compile(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let rules = RuleSet::from_configs(&config.rules)?;
        Ok(Self {
            extractor: FeatureExtractor::new(config.features.clone()),
            weights: rules.weights(),
            aggregator: RiskAggregator::new(config.thresholds()?),
            alerts: AlertGenerator::new(config.severity_cutoffs()?),
            rules,
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn aggregator(&self) -> &RiskAggregator {
        &self.aggregator
    }

    /// Score one transaction against the given history. Pure.
    pub fn assess(&self, txn: &Transaction, history: &AccountHistory) -> Assessment {
        let features = self.extractor.extract(txn, history);
        let outcomes = self.rules.evaluate_all(&features);
        let score = self.aggregator.aggregate(txn, outcomes, &self.weights);
        let alert = self.alerts.maybe_generate(&score);

        let mut events = vec![EngineEvent::TransactionScored {
            at: score.computed_at,
            transaction_id: score.transaction_id.clone(),
            account_id: score.account_id.clone(),
            risk_score: score.risk_score,
            disposition: score.disposition,
        }];
        if let Some(alert) = &alert {
            events.push(EngineEvent::AlertRaised {
                at: alert.created_at,
                alert_id: alert.id.clone(),
                transaction_id: alert.transaction_id.clone(),
                account_id: alert.account_id.clone(),
                severity: alert.severity,
            });
        }

        Assessment {
            score,
            features,
            alert,
            events,
        }
    }
}

/// Result of scoring one transaction.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub score: ScoreResult,
    pub features: FeatureSet,
    pub alert: Option<Alert>,
    pub events: Vec<EngineEvent>,
}

pub struct FraudEngine {
    policy: ArcSwap<ScoringPolicy>,
    histories: HistoryStore,
    stats: Mutex<RuleStatsBook>,
}

impl FraudEngine {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let policy = ScoringPolicy::compile(config)?;
        log::info!(
            "engine ready: rules={} enabled={} history_window={}",
            policy.rules.len(),
            policy.rules.enabled_count(),
            config.features.history_window
        );
        Ok(Self {
            policy: ArcSwap::from_pointee(policy),
            histories: HistoryStore::new(config.features.history_window),
            stats: Mutex::new(RuleStatsBook::new()),
        })
    }

    /// The policy snapshot new scoring calls will use.
    pub fn policy(&self) -> Arc<ScoringPolicy> {
        self.policy.load_full()
    }

    /// Score against the engine-owned history, then record the transaction.
    pub fn score(&self, txn: &Transaction) -> EngineResult<Assessment> {
        let policy = self.policy.load_full();
        let handle = self.histories.handle(&txn.account_id);
        let mut history = handle.lock();

        if let Some(last_seen) = history.last_timestamp() {
            if txn.timestamp < last_seen {
                log::warn!(
                    "txn={} account={} rejected: older than last seen {}",
                    txn.id,
                    txn.account_id,
                    last_seen
                );
                return Err(EngineError::OutOfOrder {
                    account_id: txn.account_id.clone(),
                    last_seen,
                    received: txn.timestamp,
                });
            }
        }

        if history.contains(&txn.id) {
            log::warn!("txn={} account={} rejected: already scored", txn.id, txn.account_id);
            return Err(EngineError::DuplicateTransaction {
                account_id: txn.account_id.clone(),
                transaction_id: txn.id.clone(),
            });
        }

        let assessment = policy.assess(txn, &history);
        history.record(txn);
        drop(history);

        self.stats.lock().record_score(&assessment.score);

        if !assessment.features.degraded.is_empty() {
            log::debug!(
                "txn={} degraded features: {:?}",
                txn.id,
                assessment.features.degraded
            );
        }
        log::debug!(
            "txn={} account={} score={:.1} disposition={}",
            txn.id,
            txn.account_id,
            assessment.score.risk_score,
            assessment.score.disposition
        );
        if let Some(alert) = &assessment.alert {
            log::info!(
                "txn={} alert={} severity={} score={:.1}",
                txn.id,
                alert.id,
                alert.severity,
                assessment.score.risk_score
            );
        }
        Ok(assessment)
    }

    /// Score against an explicitly supplied history. Touches no engine state.
    pub fn assess(&self, txn: &Transaction, history: &AccountHistory) -> Assessment {
        self.policy.load().assess(txn, history)
    }

    /// Validate and install a new policy. On error the old policy stays live.
    pub fn reload(&self, config: &EngineConfig) -> EngineResult<EngineEvent> {
        let policy = match ScoringPolicy::compile(config) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("config reload rejected: {e}");
                return Err(e);
            }
        };
        let event = EngineEvent::ConfigReloaded {
            rule_count: policy.rules.len(),
            enabled_rules: policy.rules.enabled_count(),
        };
        // History windows are fixed when an account is first seen.
        if config.features.history_window != self.histories.window() {
            log::warn!(
                "history_window change to {} ignored until restart (current {})",
                config.features.history_window,
                self.histories.window()
            );
        }
        self.policy.store(Arc::new(policy));
        log::info!("config reloaded: {event:?}");
        Ok(event)
    }

    pub fn history(&self, account_id: &str) -> Option<AccountHistory> {
        self.histories.snapshot(account_id)
    }

    /// Install a history loaded from elsewhere, replacing any existing one.
    pub fn seed_history(&self, history: AccountHistory) {
        self.histories.seed(history);
    }

    pub fn account_count(&self) -> usize {
        self.histories.account_count()
    }

    pub fn rule_stats(&self) -> BTreeMap<RuleId, RuleStats> {
        self.stats.lock().snapshot()
    }

    /// Feed an investigator's verdict back into the rule statistics.
    pub fn record_verdict(&self, alert: &Alert) {
        self.stats.lock().record_verdict(alert);
    }
}
