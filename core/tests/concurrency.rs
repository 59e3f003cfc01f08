//! Parallel scoring: accounts are independent, one account is serialized.

use chrono::DateTime;
use fraudwatch_core::{
    aggregator::Disposition,
    config::EngineConfig,
    engine::FraudEngine,
    error::{EngineError, EngineResult},
    history::{AccountHistory, HistoryStore},
    transaction::Transaction,
    workload::{self, WorkloadConfig},
};
use std::collections::BTreeMap;
use std::thread;

const THREADS: usize = 4;

fn stream() -> Vec<Transaction> {
    let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").expect("valid timestamp");
    let mut config = WorkloadConfig::new(20, 1500, start);
    config.fraud_rate = 0.05;
    workload::generate(&config, 0xC0FFEE)
}

fn score_all(engine: &FraudEngine, txns: &[&Transaction]) -> BTreeMap<String, (f64, Disposition)> {
    txns.iter()
        .map(|t| {
            let a = engine.score(t).expect("in-order transaction scores");
            (t.id.clone(), (a.score.risk_score, a.score.disposition))
        })
        .collect()
}

#[test]
fn parallel_scoring_matches_sequential() {
    let _ = env_logger::builder().is_test(true).try_init();
    let txns = stream();
    let all: Vec<&Transaction> = txns.iter().collect();

    let sequential = score_all(&FraudEngine::new(&EngineConfig::default_test()).expect("engine"), &all);

    // Partition by account so every account's stream stays in order.
    let mut partitions: Vec<Vec<&Transaction>> = vec![Vec::new(); THREADS];
    for txn in &txns {
        let bucket = txn.account_id.bytes().map(usize::from).sum::<usize>() % THREADS;
        partitions[bucket].push(txn);
    }

    let engine = FraudEngine::new(&EngineConfig::default_test()).expect("engine");
    let parallel: BTreeMap<String, (f64, Disposition)> = thread::scope(|s| {
        let handles: Vec<_> = partitions
            .iter()
            .map(|part| {
                let engine = &engine;
                s.spawn(move || score_all(engine, part))
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("scoring thread panicked"))
            .collect()
    });

    assert_eq!(parallel.len(), txns.len());
    assert_eq!(parallel, sequential);
    assert_eq!(engine.account_count(), 20);
}

#[test]
fn same_account_from_many_threads_keeps_a_consistent_history() -> EngineResult<()> {
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    let base = DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z").expect("valid timestamp");
    let template = stream().into_iter().next().expect("non-empty stream");

    // Identical timestamps are never out of order, so every call succeeds.
    thread::scope(|s| {
        for worker in 0..THREADS {
            let engine = &engine;
            let template = &template;
            s.spawn(move || {
                for i in 0..25 {
                    let mut txn = template.clone();
                    txn.id = format!("w{worker}-{i}");
                    txn.account_id = "shared".into();
                    txn.timestamp = base;
                    engine.score(&txn).expect("equal timestamps are accepted");
                }
            });
        }
    });

    let history = engine.history("shared").expect("history exists");
    assert_eq!(history.len(), THREADS * 25);
    Ok(())
}

#[test]
fn older_transaction_for_same_account_is_rejected() -> EngineResult<()> {
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    let mut txns = stream().into_iter().filter(|t| t.account_id == "acct-0001");
    let first = txns.next().expect("first txn");
    let second = txns.next().expect("second txn");
    assert!(second.timestamp > first.timestamp);

    engine.score(&second)?;
    let err = engine.score(&first).unwrap_err();
    assert!(matches!(err, EngineError::OutOfOrder { ref account_id, .. } if account_id == "acct-0001"));
    assert_eq!(engine.history("acct-0001").map(|h| h.len()), Some(1));
    Ok(())
}

#[test]
fn reload_during_scoring_never_fails_a_call() -> EngineResult<()> {
    let engine = FraudEngine::new(&EngineConfig::default_test())?;
    let txns = stream();

    thread::scope(|s| {
        let engine = &engine;
        let scorer = s.spawn(move || {
            for txn in &txns {
                engine.score(txn).expect("scoring survives reloads");
            }
        });
        let reloader = s.spawn(move || {
            for i in 0..50 {
                let mut config = EngineConfig::default_test();
                config.rules[0].enabled = i % 2 == 0;
                engine.reload(&config).expect("valid config reloads");
            }
        });
        scorer.join().expect("scorer panicked");
        reloader.join().expect("reloader panicked");
    });
    Ok(())
}

#[test]
fn seeding_keeps_handles_held_by_scorers() {
    let store = HistoryStore::new(100);
    let txns: Vec<Transaction> = stream().into_iter().filter(|t| t.account_id == "acct-0001").take(4).collect();

    // A scorer took the lock handle before the seed landed.
    let held = store.handle("acct-0001");
    store.seed(AccountHistory::from_transactions("acct-0001", 100, &txns[..3]));
    held.lock().record(&txns[3]);

    let history = store.snapshot("acct-0001").expect("history exists");
    assert_eq!(history.len(), 4);
    assert_eq!(history.recent_transactions.back().map(|t| t.id.as_str()), Some(txns[3].id.as_str()));
    assert!(std::sync::Arc::ptr_eq(&held, &store.handle("acct-0001")));
}
