//! fraud-runner: headless scoring runner for the fraud engine.
//!
//! Usage:
//!   fraud-runner --data-dir ./data --db run.db --input txns.jsonl
//!   fraud-runner --data-dir ./data --synthetic 5000 --seed 42 --accounts 50
//!   fraud-runner --data-dir ./data --synthetic 500 --ipc-mode

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use fraudwatch_core::{
    aggregator::Disposition,
    case::{AlertSummary, CaseManager, CaseMetrics},
    command::InvestigatorCommand,
    config::EngineConfig,
    engine::FraudEngine,
    error::EngineError,
    event::{EngineEvent, EventLogEntry},
    stats::RuleStats,
    store::FraudStore,
    transaction::Transaction,
    types::Timestamp,
    workload::{self, WorkloadConfig},
};
use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Score { transaction: Transaction },
    Investigate { command: InvestigatorCommand },
    Quit,
}

#[derive(serde::Serialize)]
struct DeskState {
    clock: Option<Timestamp>,
    scored: u64,
    rejected: u64,
    dispositions: BTreeMap<Disposition, u64>,
    alerts: AlertSummary,
    cases: CaseMetrics,
    rule_stats: BTreeMap<String, RuleStats>,
}

/// Engine, case manager and store wired together.
struct Desk {
    engine: FraudEngine,
    cases: CaseManager,
    store: FraudStore,
    /// Timestamp of the newest transaction seen; investigator commands
    /// are stamped with it so replays stay deterministic.
    clock: Option<Timestamp>,
    scored: u64,
    rejected: u64,
    dispositions: BTreeMap<Disposition, u64>,
}

impl Desk {
    fn new(config: &EngineConfig, store: FraudStore) -> Result<Self> {
        Ok(Self {
            engine: FraudEngine::new(config)?,
            cases: CaseManager::new(config.merge_window()?),
            store,
            clock: None,
            scored: 0,
            rejected: 0,
            dispositions: BTreeMap::new(),
        })
    }

    fn process(&mut self, txn: &Transaction) -> Result<()> {
        if self.store.get_score_result(&txn.id)?.is_some() {
            log::warn!("skipping txn={}: already scored", txn.id);
            self.rejected += 1;
            return Ok(());
        }
        let assessment = match self.engine.score(txn) {
            Ok(a) => a,
            Err(e @ (EngineError::OutOfOrder { .. } | EngineError::DuplicateTransaction { .. })) => {
                log::warn!("skipping txn={}: {e}", txn.id);
                self.rejected += 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.clock = Some(self.clock.map_or(txn.timestamp, |c| c.max(txn.timestamp)));
        self.scored += 1;
        *self.dispositions.entry(assessment.score.disposition).or_default() += 1;

        self.store.insert_score_result(&assessment.score)?;
        self.persist(&assessment.events)?;

        if let Some(alert) = assessment.alert {
            self.store.insert_alert(&alert)?;
            let (assignment, events) = self.cases.ingest_alert(alert)?;
            self.persist(&events)?;
            if let Some(case) = self.cases.get_case(&assignment.case_id) {
                self.store.upsert_case(case)?;
            }
        }
        Ok(())
    }

    fn investigate(&mut self, command: InvestigatorCommand) -> Result<()> {
        let at = self.clock.unwrap_or_else(now);
        let events = self.cases.apply(command.clone(), at)?;
        self.persist(&events)?;

        match &command {
            InvestigatorCommand::AcknowledgeAlert { alert_id }
            | InvestigatorCommand::ResolveAlert { alert_id, .. }
            | InvestigatorCommand::DismissAlert { alert_id } => {
                if let Some(alert) = self.cases.get_alert(alert_id) {
                    self.store.update_alert(alert)?;
                    if alert.verdict.is_some() {
                        self.engine.record_verdict(alert);
                    }
                }
            }
            InvestigatorCommand::StartInvestigation { case_id }
            | InvestigatorCommand::AssignCase { case_id, .. }
            | InvestigatorCommand::AddCaseNote { case_id, .. }
            | InvestigatorCommand::ResolveCase { case_id } => {
                if let Some(case) = self.cases.get_case(case_id) {
                    self.store.upsert_case(case)?;
                }
            }
        }
        Ok(())
    }

    fn persist(&self, events: &[EngineEvent]) -> Result<()> {
        for event in events {
            self.store.append_event(&EventLogEntry::from_event(event)?)?;
        }
        Ok(())
    }

    fn state(&self) -> DeskState {
        DeskState {
            clock: self.clock,
            scored: self.scored,
            rejected: self.rejected,
            dispositions: self.dispositions.clone(),
            alerts: self.cases.alert_summary(),
            cases: self.cases.metrics(),
            rule_stats: self.engine.rule_stats(),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let synthetic = parse_arg(&args, "--synthetic", 0usize);
    let accounts = parse_arg(&args, "--accounts", 25usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let input = string_arg(&args, "--input");

    if !ipc_mode {
        println!("fraud-runner");
        println!("  data_dir:  {data_dir}");
        println!("  db:        {db}");
        match input {
            Some(path) => println!("  input:     {path}"),
            None => println!("  synthetic: {synthetic} txns, {accounts} accounts, seed {seed}"),
        }
        println!();
    }

    let config = EngineConfig::load(data_dir)?;
    let store = if db == ":memory:" {
        FraudStore::in_memory()?
    } else {
        FraudStore::open(db)?
    };
    store.migrate()?;

    let mut desk = Desk::new(&config, store)?;

    let transactions = match input {
        Some(path) => read_jsonl(path)?,
        None => {
            let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")?;
            workload::generate(&WorkloadConfig::new(accounts, synthetic, start), seed)
        }
    };
    for txn in &transactions {
        desk.process(txn)?;
    }

    if ipc_mode {
        run_ipc_loop(&mut desk)?;
    } else {
        print_summary(&desk)?;
    }
    Ok(())
}

fn run_ipc_loop(desk: &mut Desk) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };

        let outcome = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => Ok(()),
            IpcCommand::Score { transaction } => desk.process(&transaction),
            IpcCommand::Investigate { command } => desk.investigate(command),
        };
        match outcome {
            Ok(()) => writeln!(stdout, "{}", serde_json::to_string(&desk.state())?)?,
            // Rejected commands leave state untouched; report and keep serving.
            Err(e) => write_error(&mut stdout, &format!("{e:#}"))?,
        }
        stdout.flush()?;
    }
    Ok(())
}

fn write_error(stdout: &mut io::Stdout, message: &str) -> Result<()> {
    let err_json = serde_json::json!({ "error": message });
    writeln!(stdout, "{}", err_json)?;
    stdout.flush()?;
    Ok(())
}

fn read_jsonl(path: &str) -> Result<Vec<Transaction>> {
    let file = File::open(path).with_context(|| format!("Cannot open {path}"))?;
    let mut out = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let txn: Transaction =
            serde_json::from_str(&line).with_context(|| format!("{path}:{}: bad transaction", n + 1))?;
        out.push(txn);
    }
    Ok(out)
}

fn print_summary(desk: &Desk) -> Result<()> {
    let state = desk.state();
    let store = &desk.store;

    println!("=== RUN SUMMARY ===");
    println!("  scored:         {}", state.scored);
    println!("  rejected:       {}", state.rejected);
    for (disposition, count) in &state.dispositions {
        println!("  {:<14}  {count}", format!("{disposition}:"));
    }
    println!("  stored results: {}", store.score_result_count()?);
    println!("  events logged:  {}", store.event_count()?);
    println!("  accounts:       {}", desk.engine.account_count());

    println!();
    println!("=== ALERTS (active) ===");
    println!(
        "  critical: {}  high: {}  medium: {}  low: {}  total: {}",
        state.alerts.critical, state.alerts.high, state.alerts.medium, state.alerts.low, state.alerts.total_active
    );

    println!();
    println!("=== CASES ===");
    println!(
        "  open: {}  investigating: {}  resolved: {}",
        state.cases.open, state.cases.investigating, state.cases.resolved
    );

    println!();
    println!("=== RULES ===");
    if state.rule_stats.is_empty() {
        println!("  (No rule triggered)");
    } else {
        for (rule_id, stats) in &state.rule_stats {
            println!(
                "  {rule_id} | triggers: {} | TP: {} | FP: {} | accuracy: {:.1}%",
                stats.triggers,
                stats.true_positives,
                stats.false_positives,
                stats.accuracy()
            );
        }
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}
