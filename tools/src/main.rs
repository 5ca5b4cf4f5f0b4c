//! score-runner: headless batch scorer for fraudscore.
//!
//! Reads one JSON transaction submission per line and prints one JSON
//! outcome per line. Bad lines get an `{"error": ...}` line and the run
//! continues.
//!
//! Usage:
//!   score-runner --db scores.db --input txns.jsonl
//!   score-runner --config scoring.json --seed 7 < txns.jsonl
//!   score-runner --blacklist 203.0.113.5,198.51.100.7 --input txns.jsonl

use anyhow::Result;
use fraudscore_core::{
    config::ScoringConfig, engine::ScoringEngine, pipeline::ScoringOutcome, store::FraudStore,
    transaction::TransactionSubmission,
};
use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

#[derive(Default)]
struct RunTally {
    lines: u64,
    scored: u64,
    flagged: u64,
    suspicious_ip: u64,
    cold_start: u64,
    errors: u64,
}

impl RunTally {
    fn record(&mut self, outcome: &ScoringOutcome) {
        self.scored += 1;
        if outcome.is_fraud {
            self.flagged += 1;
        }
        if outcome.suspicious_ip {
            self.suspicious_ip += 1;
        }
        if outcome.path == fraudscore_core::ensemble::ScoringPath::ColdStart {
            self.cold_start += 1;
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let input = flag_value(&args, "--input");

    let mut config = match flag_value(&args, "--config") {
        Some(path) => ScoringConfig::load(path)?,
        None => ScoringConfig::from_env()?,
    };
    config.master_seed = parse_arg(&args, "--seed", config.master_seed);

    eprintln!("fraudscore: score-runner");
    eprintln!("  seed:        {}", config.master_seed);
    eprintln!("  db:          {db}");
    eprintln!("  input:       {}", input.unwrap_or("<stdin>"));
    eprintln!("  classifier:  {}", config.classifier.endpoint_url());
    eprintln!();

    let store = FraudStore::open(db)?;
    store.migrate()?;
    let mut engine = ScoringEngine::build(config, store)?;
    if let Some(list) = flag_value(&args, "--blacklist") {
        for ip in list.split(',').filter(|ip| !ip.trim().is_empty()) {
            engine.blacklist_ip(ip, true)?;
        }
    }

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let tally = score_lines(&mut engine, reader)?;
    print_summary(&engine, &tally)
}

fn score_lines(engine: &mut ScoringEngine, reader: Box<dyn BufRead>) -> Result<RunTally> {
    let mut stdout = io::stdout().lock();
    let mut tally = RunTally::default();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        tally.lines += 1;

        let result = serde_json::from_str::<TransactionSubmission>(&line)
            .map_err(anyhow::Error::from)
            .and_then(|submission| engine.score(submission).map_err(anyhow::Error::from));

        match result {
            Ok(outcome) => {
                tally.record(&outcome);
                writeln!(stdout, "{}", serde_json::to_string(&outcome)?)?;
            }
            Err(e) => {
                tally.errors += 1;
                log::warn!("line {}: {e}", tally.lines);
                let err_json = serde_json::json!({ "line": tally.lines, "error": e.to_string() });
                writeln!(stdout, "{err_json}")?;
            }
        }
        stdout.flush()?;
    }
    Ok(tally)
}

fn print_summary(engine: &ScoringEngine, tally: &RunTally) -> Result<()> {
    let accounts = engine.store.account_count()?;
    let trained = engine.store.event_count("model_trained")?;

    eprintln!("=== RUN SUMMARY ===");
    eprintln!("  lines read:     {}", tally.lines);
    eprintln!("  scored:         {}", tally.scored);
    eprintln!("  flagged fraud:  {}", tally.flagged);
    eprintln!("  suspicious ip:  {}", tally.suspicious_ip);
    eprintln!("  cold start:     {}", tally.cold_start);
    eprintln!("  errors:         {}", tally.errors);
    eprintln!("  accounts:       {accounts}");
    eprintln!("  model updates:  {trained}");
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
