//! Rule evaluation, aggregation and end-to-end scoring through FraudEngine.

use chrono::DateTime;
use fraudwatch_core::{
    aggregator::{combine, Disposition, Thresholds},
    alert::Severity,
    config::{EngineConfig, RuleConfig},
    engine::FraudEngine,
    error::{EngineError, EngineResult},
    event::EngineEvent,
    history::AccountHistory,
    rules::{evaluate, HourWindow, Rule, RuleCategory, RuleOutcome, RuleSet, RuleWeights},
    transaction::{Channel, Location, Transaction},
    types::Timestamp,
};

fn ts(raw: &str) -> Timestamp {
    DateTime::parse_from_rfc3339(raw).expect("valid timestamp")
}

fn txn(id: &str, account: &str, amount: f64, at: &str) -> Transaction {
    Transaction {
        id: id.into(),
        account_id: account.into(),
        amount,
        currency: "USD".into(),
        timestamp: ts(at),
        origin_location: Location::country("US").with_region("ny").with_coordinates(40.71, -74.01),
        counterparty: "grocer".into(),
        channel: Channel::CardPresent,
    }
}

/// Five $500 transactions at 10:00 on consecutive days.
fn steady_history(account: &str) -> AccountHistory {
    let past: Vec<Transaction> = (1..=5)
        .map(|d| txn(&format!("{account}-p{d}"), account, 500.0, &format!("2024-03-0{d}T10:00:00Z")))
        .collect();
    AccountHistory::from_transactions(account, 100, &past)
}

fn outcome(rule_id: &str, triggered: bool, contribution: f64) -> RuleOutcome {
    RuleOutcome {
        rule_id: rule_id.into(),
        category: RuleCategory::Amount,
        triggered,
        contribution,
        explanation: String::new(),
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Rules ──────────────────────────────────────────────────────────

#[test]
fn disabled_rule_never_contributes() -> EngineResult<()> {
    let mut raw = EngineConfig::default_test().rules[0].clone();
    raw.enabled = false;
    let rule = Rule::from_config(&raw)?;

    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    let features = engine
        .assess(&txn("t1", "a", 15_000.0, "2024-03-06T10:00:00Z"), &steady_history("a"))
        .features;
    assert!(features.amount_ratio > 5.0);

    let result = evaluate(&rule, &features);
    assert!(!result.triggered);
    assert_eq!(result.contribution, 0.0);
    Ok(())
}

#[test]
fn disabled_rule_is_absent_from_scores() -> EngineResult<()> {
    let mut config = EngineConfig::default_test();
    config.rules[0].enabled = false;
    let engine = FraudEngine::new(&config)?;

    let assessment = engine.assess(&txn("t1", "a", 15_000.0, "2024-03-06T10:00:00Z"), &steady_history("a"));
    assert!(assessment.score.triggered_rule_ids().all(|id| id != "R001"));
    assert_eq!(assessment.score.disposition, Disposition::Pass);
    Ok(())
}

#[test]
fn thresholds_are_strict() -> EngineResult<()> {
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    // 2500 / 500 = exactly 5.0, which does not exceed the threshold.
    let assessment = engine.assess(&txn("t1", "a", 2_500.0, "2024-03-06T10:00:00Z"), &steady_history("a"));
    assert!((assessment.features.amount_ratio - 5.0).abs() < 1e-9);
    assert!(assessment.score.triggered_rule_ids().all(|id| id != "R001"));
    Ok(())
}

#[test]
fn off_hours_window_wraps_midnight() {
    let window = HourWindow { start: 23, end: 6 };
    assert!(window.contains(23));
    assert!(window.contains(0));
    assert!(window.contains(6));
    assert!(!window.contains(7));
    assert!(!window.contains(12));

    let daytime = HourWindow { start: 9, end: 17 };
    assert!(daytime.contains(9));
    assert!(!daytime.contains(18));
}

#[test]
fn temporal_rule_triggers_inside_off_hours_window() -> EngineResult<()> {
    let mut config = EngineConfig::default_test();
    config.rules[3].off_hours = Some(HourWindow { start: 23, end: 6 });
    let engine = FraudEngine::new(&config)?;

    // A brand-new account has no usual hours, so only the window can fire.
    let assessment = engine.assess(&txn("t1", "a", 20.0, "2024-03-06T02:00:00Z"), &AccountHistory::new("a", 100));
    let ids: Vec<&str> = assessment.score.triggered_rule_ids().collect();
    assert_eq!(ids, vec!["R004"]);
    assert!((assessment.score.risk_score - 10.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn weekend_option_triggers_temporal_rule_on_saturday_and_sunday() -> EngineResult<()> {
    let mut config = EngineConfig::default_test();
    config.rules[3].weekend = true;
    let engine = FraudEngine::new(&config)?;
    let fresh = AccountHistory::new("a", 100);

    for at in ["2024-03-09T12:00:00Z", "2024-03-10T12:00:00Z"] {
        let assessment = engine.assess(&txn("t1", "a", 20.0, at), &fresh);
        assert!(assessment.features.weekday >= 5);
        let ids: Vec<&str> = assessment.score.triggered_rule_ids().collect();
        assert_eq!(ids, vec!["R004"], "{at}");
        assert!(assessment.score.contributing_outcomes[0].explanation.contains("weekend"));
    }

    let weekday = engine.assess(&txn("t2", "a", 20.0, "2024-03-06T12:00:00Z"), &fresh);
    assert_eq!(weekday.score.triggered_rule_ids().count(), 0);

    // Without the option a weekend is unremarkable.
    let plain = FraudEngine::new(&EngineConfig::default_test())?;
    let saturday = plain.assess(&txn("t3", "a", 20.0, "2024-03-09T12:00:00Z"), &fresh);
    assert_eq!(saturday.score.triggered_rule_ids().count(), 0);
    Ok(())
}

#[test]
fn rule_set_rejects_duplicate_ids() {
    let mut rules = EngineConfig::default_test().rules;
    rules[1].id = "R001".into();
    let err = RuleSet::from_configs(&rules).unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfiguration { .. }), "got {err}");
}

#[test]
fn rule_set_is_ordered_by_id() -> EngineResult<()> {
    let mut rules: Vec<RuleConfig> = EngineConfig::default_test().rules;
    rules.reverse();
    let set = RuleSet::from_configs(&rules)?;
    let ids: Vec<&str> = set.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["R001", "R002", "R003", "R004", "R005"]);
    assert_eq!(set.get("R003").map(|r| r.category()), Some(RuleCategory::Geographic));
    Ok(())
}

// ── Aggregation ────────────────────────────────────────────────────

#[test]
fn aggregate_is_bounded() {
    let weights: RuleWeights = (0..10).map(|i| (format!("R{i:03}"), 1.0)).collect();
    let many: Vec<RuleOutcome> = (0..10).map(|i| outcome(&format!("R{i:03}"), true, 100.0)).collect();
    assert_eq!(combine(&many, &weights), 100.0);
    assert_eq!(combine(&[], &weights), 0.0);

    let untriggered = vec![outcome("R000", false, 100.0)];
    assert_eq!(combine(&untriggered, &weights), 0.0);

    // No weight configured for the rule: contributes nothing.
    let unknown = vec![outcome("R999", true, 50.0)];
    assert_eq!(combine(&unknown, &weights), 0.0);
}

#[test]
fn adding_a_triggered_outcome_never_lowers_the_score() {
    let weights: RuleWeights = [("R001".to_string(), 1.0), ("R002".to_string(), 0.5), ("R003".to_string(), 2.0)]
        .into_iter()
        .collect();
    let mut outcomes = vec![outcome("R001", true, 30.0)];
    let mut previous = combine(&outcomes, &weights);
    for (id, contribution) in [("R002", 20.0), ("R003", 40.0)] {
        outcomes.push(outcome(id, true, contribution));
        let next = combine(&outcomes, &weights);
        assert!(next >= previous, "{next} < {previous}");
        previous = next;
    }
    assert_eq!(previous, 100.0);
}

#[test]
fn ties_resolve_to_the_more_severe_disposition() -> EngineResult<()> {
    let thresholds = Thresholds::new(50.0, 80.0)?;
    assert_eq!(thresholds.disposition(49.99), Disposition::Pass);
    assert_eq!(thresholds.disposition(50.0), Disposition::Flag);
    assert_eq!(thresholds.disposition(79.99), Disposition::Flag);
    assert_eq!(thresholds.disposition(80.0), Disposition::Block);
    assert_eq!(thresholds.disposition(100.0), Disposition::Block);
    Ok(())
}

// ── End to end ─────────────────────────────────────────────────────

#[test]
fn large_amount_against_steady_history_is_blocked() -> EngineResult<()> {
    init_logging();
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    engine.seed_history(steady_history("acct-big"));

    let assessment = engine.score(&txn("t-big", "acct-big", 15_000.0, "2024-03-06T10:00:00Z"))?;

    assert!((assessment.features.amount_ratio - 30.0).abs() < 1e-9);
    assert_eq!(assessment.score.risk_score, 85.0);
    assert_eq!(assessment.score.disposition, Disposition::Block);
    let ids: Vec<&str> = assessment.score.triggered_rule_ids().collect();
    assert_eq!(ids, vec!["R001"]);

    let alert = assessment.alert.expect("blocked transaction raises an alert");
    assert_eq!(alert.id, "alert-t-big");
    assert_eq!(alert.severity, Severity::Critical);
    assert!(alert.requires_manual_review);
    assert_eq!(alert.evidence, assessment.score);
    assert!(alert
        .recommendations
        .iter()
        .any(|r| r == "Block transaction and investigate immediately"));

    assert_eq!(assessment.events.len(), 2);
    assert!(matches!(assessment.events[1], EngineEvent::AlertRaised { severity: Severity::Critical, .. }));
    Ok(())
}

#[test]
fn manual_review_needs_high_severity_or_two_triggered_rules() -> EngineResult<()> {
    let mut config = EngineConfig::default_test();
    config.rules[0].score = 55.0;
    let engine = FraudEngine::new(&config)?;
    let history = steady_history("a");

    let single = engine.assess(&txn("t1", "a", 15_000.0, "2024-03-06T10:00:00Z"), &history);
    let alert = single.alert.expect("flagged transaction raises an alert");
    assert_eq!(alert.severity, Severity::Low);
    assert!(!alert.requires_manual_review);

    // Off the account's usual hour: R001 and R004 both trigger.
    let double = engine.assess(&txn("t2", "a", 15_000.0, "2024-03-06T03:00:00Z"), &history);
    let alert = double.alert.expect("flagged transaction raises an alert");
    assert_eq!(alert.severity, Severity::Medium);
    assert_eq!(alert.evidence.contributing_outcomes.len(), 2);
    assert!(alert.requires_manual_review);
    Ok(())
}

#[test]
fn duplicate_transaction_is_rejected_without_touching_state() -> EngineResult<()> {
    init_logging();
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    engine.seed_history(steady_history("a"));
    let current = txn("t-dup", "a", 15_000.0, "2024-03-06T10:00:00Z");

    engine.score(&current)?;
    let err = engine.score(&current).unwrap_err();
    assert!(matches!(
        err,
        EngineError::DuplicateTransaction { ref transaction_id, .. } if transaction_id == "t-dup"
    ));
    assert_eq!(engine.history("a").map(|h| h.len()), Some(6));
    assert_eq!(engine.rule_stats().get("R001").map(|s| s.triggers), Some(1));
    Ok(())
}

#[test]
fn small_amount_on_new_account_passes_without_alert() -> EngineResult<()> {
    init_logging();
    let engine = FraudEngine::new(&EngineConfig::default_test())?;

    let assessment = engine.score(&txn("t-new", "acct-new", 50.0, "2024-03-06T10:00:00Z"))?;

    assert_eq!(assessment.score.risk_score, 0.0);
    assert_eq!(assessment.score.disposition, Disposition::Pass);
    assert!(assessment.score.contributing_outcomes.is_empty());
    assert!(assessment.alert.is_none());
    assert_eq!(assessment.features.degraded.len(), 4);
    assert_eq!(engine.history("acct-new").map(|h| h.len()), Some(1));
    Ok(())
}

#[test]
fn assessing_twice_gives_identical_results() -> EngineResult<()> {
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    let history = steady_history("a");
    let mut current = txn("t1", "a", 4_000.0, "2024-03-06T03:00:00Z");
    current.origin_location = Location::country("YY");

    let first = engine.assess(&current, &history);
    let second = engine.assess(&current, &history);
    assert_eq!(first.score, second.score);
    assert_eq!(first.features, second.features);
    assert_eq!(first.alert, second.alert);
    assert!(engine.history("a").is_none(), "assess must not touch engine state");
    Ok(())
}

#[test]
fn contributing_outcomes_are_triggered_and_ordered() -> EngineResult<()> {
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    let mut current = txn("t1", "a", 15_000.0, "2024-03-06T03:00:00Z");
    current.origin_location = Location::country("XX");
    current.channel = Channel::Wire;
    current.counterparty = "unknown-payee".into();

    let assessment = engine.assess(&current, &steady_history("a"));
    let ids: Vec<&str> = assessment.score.triggered_rule_ids().collect();
    assert_eq!(ids, vec!["R001", "R003", "R004", "R005"]);
    assert!(assessment.score.contributing_outcomes.iter().all(|o| o.triggered));
    assert_eq!(assessment.score.risk_score, 100.0);
    Ok(())
}

#[test]
fn reload_swaps_policy_and_rejects_invalid_config() -> EngineResult<()> {
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    let history = steady_history("a");
    let current = txn("t1", "a", 15_000.0, "2024-03-06T10:00:00Z");
    assert_eq!(engine.assess(&current, &history).score.disposition, Disposition::Block);

    let mut broken = EngineConfig::default_test();
    broken.thresholds.block_threshold = 40.0;
    let err = engine.reload(&broken).unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfiguration { .. }));
    assert_eq!(engine.assess(&current, &history).score.disposition, Disposition::Block);

    let mut relaxed = EngineConfig::default_test();
    relaxed.rules[0].score = 60.0;
    let event = engine.reload(&relaxed)?;
    assert_eq!(
        event,
        EngineEvent::ConfigReloaded {
            rule_count: 5,
            enabled_rules: 5
        }
    );
    assert_eq!(engine.assess(&current, &history).score.disposition, Disposition::Flag);
    Ok(())
}

#[test]
fn rule_stats_track_triggers_and_verdicts() -> EngineResult<()> {
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    engine.seed_history(steady_history("a"));

    let assessment = engine.score(&txn("t1", "a", 15_000.0, "2024-03-06T10:00:00Z"))?;
    let mut alert = assessment.alert.expect("alert raised");
    assert_eq!(engine.rule_stats().get("R001").map(|s| s.triggers), Some(1));

    alert.resolve(true, ts("2024-03-06T12:00:00Z"))?;
    engine.record_verdict(&alert);

    let stats = engine.rule_stats();
    let r001 = stats.get("R001").expect("R001 stats");
    assert_eq!(r001.true_positives, 1);
    assert_eq!(r001.false_positives, 0);
    assert_eq!(r001.accuracy(), 100.0);
    Ok(())
}
