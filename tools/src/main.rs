//! aml-runner: headless generation runner.
//!
//! Usage:
//!   aml-runner --seed 12345 --customers 400 --db run.db
//!   aml-runner --seed 12345 --start 2024-01-01 --end 2024-12-31 --as-of 2024-12-15 --json-dir out/
//!   aml-runner --data-dir ./data --db run.db --json-dir out/
//!
//! Without --data-dir the tables compiled into the binary are used.
//! Nothing is written unless the whole run succeeds.

use amlsynth_core::{
    config::GeneratorConfig,
    engine::{GenerationEngine, GenerationOutput},
    projection,
    store::SimStore,
    types::RiskTier,
};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = flag_value(&args, "--data-dir");
    let db = flag_value(&args, "--db");
    let json_dir = flag_value(&args, "--json-dir");

    let mut config = match data_dir {
        Some(dir) => GeneratorConfig::load(dir)?,
        None => GeneratorConfig::embedded()?,
    };
    config.run.seed = parse_arg(&args, "--seed", config.run.seed);
    config.run.customers = parse_arg(&args, "--customers", config.run.customers);
    if let Some(start) = flag_value(&args, "--start") {
        config.run.start_date = parse_date(start)?;
    }
    if let Some(end) = flag_value(&args, "--end") {
        config.run.end_date = parse_date(end)?;
    }
    if let Some(as_of) = flag_value(&args, "--as-of") {
        config.run.as_of_date = Some(parse_date(as_of)?);
    }

    let seed = config.run.seed;
    println!("AML synthetic data runner");
    println!("  seed:      {seed}");
    println!("  customers: {}", config.run.customers);
    println!("  window:    {} .. {}", config.run.start_date, config.run.end_date);
    println!("  as_of:     {}", config.run.as_of());
    println!("  data_dir:  {}", data_dir.unwrap_or("(embedded)"));
    println!("  db:        {}", db.unwrap_or("(none)"));
    println!("  json_dir:  {}", json_dir.unwrap_or("(none)"));
    println!();

    let run_id = format!("run-{seed}-{}", Utc::now().format("%Y%m%dT%H%M%S"));
    let output = GenerationEngine::build(run_id, config)?
        .run()
        .context("generation failed, no output written")?;

    if let Some(path) = db {
        let store = SimStore::open(path)?;
        store.migrate()?;
        store.export(&output)?;
        log::info!("runner: database written to {path}");
    }
    if let Some(dir) = json_dir {
        projection::write_json(&output, Path::new(dir))?;
        log::info!("runner: json written under {dir}");
    }

    print_summary(&output);
    Ok(())
}

fn print_summary(output: &GenerationOutput) {
    let report = &output.report;
    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {}", report.run_id);
    println!("  as_of:           {}", report.as_of);
    println!("  customers:       {}", report.customers);
    println!("  accounts:        {}", report.accounts);
    println!("  counterparties:  {}", report.counterparties);
    println!("  baseline txns:   {}", report.baseline_transactions);
    println!("  injected txns:   {}", report.injected_transactions);
    println!("  news items:      {}", report.news_items);
    println!("  signal records:  {}", report.signal_records);

    println!();
    println!("=== SCENARIOS ===");
    for (typology, n) in &report.scenarios_by_typology {
        println!("  {:<20} {n}", typology.as_str());
    }
    println!("  {:<20} {}", "total", report.scenario_count());

    println!();
    println!("=== ALERTS ===");
    let dist = &report.alerts;
    for tier in RiskTier::ALL {
        let share = dist.shares.get(&tier).copied().unwrap_or(0.0);
        println!(
            "  {:<9} {:>6}  {:>5.1}%  (target {:>4.1}%)",
            tier.as_str(),
            dist.count(tier),
            share * 100.0,
            dist.targets.share(tier) * 100.0
        );
    }
    println!("  total     {:>6}", dist.total);
    println!(
        "  within tolerance: {}  (max deviation {:.1} pts)",
        dist.within_tolerance,
        dist.max_deviation * 100.0
    );
    println!("  calibration fillers: {}", report.filler_alerts);
    println!(
        "  true positives: {}  false positives: {}  precision: {:.3}",
        report.true_positive_alerts, report.false_positive_alerts, report.precision
    );

    println!();
    println!("=== CASES ===");
    println!("  opened:     {}", report.cases_opened);
    println!("  still open: {}", report.cases_still_open);
    for (disposition, n) in &report.dispositions {
        println!("  {:<16} {n}", disposition.as_str());
    }

    if !report.shortfalls.is_empty() {
        println!();
        println!("=== WARNINGS ===");
        for shortfall in &report.shortfalls {
            println!("  {shortfall}");
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("invalid date '{value}'"))
}
