//! The visible projection must never leak ground truth.
//!
//! A monitoring system sees transactions, accounts, signals, alerts and
//! cases. It must not see which of them were injected.

use amlsynth_core::{
    engine::{GenerationEngine, GenerationOutput},
    projection::{evaluation_view, ground_truth_view, visible_view, write_json},
};
use serde_json::Value;
use std::collections::BTreeSet;

const TRUTH_KEYS: [&str; 6] = [
    "is_suspicious",
    "typology",
    "typologies",
    "scenario_id",
    "scenario_ids",
    "true_positive",
];

fn run(seed: u64) -> GenerationOutput {
    GenerationEngine::build_test(seed)
        .expect("engine")
        .run()
        .expect("run")
}

fn collect_keys(value: &Value, keys: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                keys.insert(k.clone());
                collect_keys(v, keys);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_keys(v, keys);
            }
        }
        _ => {}
    }
}

fn assert_no_truth(label: &str, value: Value) {
    let mut keys = BTreeSet::new();
    collect_keys(&value, &mut keys);
    for key in TRUTH_KEYS {
        assert!(
            !keys.contains(key),
            "visible {label} leaks ground-truth field '{key}'"
        );
    }
}

#[test]
fn visible_records_carry_no_truth_fields() {
    let out = run(42);
    let view = visible_view(&out);
    assert_no_truth("customers", serde_json::to_value(view.customers).expect("customers"));
    assert_no_truth("accounts", serde_json::to_value(view.accounts).expect("accounts"));
    assert_no_truth("transactions", serde_json::to_value(&view.transactions).expect("transactions"));
    assert_no_truth("signals", serde_json::to_value(view.signals).expect("signals"));
    assert_no_truth("alerts", serde_json::to_value(view.alerts).expect("alerts"));
    assert_no_truth("cases", serde_json::to_value(view.cases).expect("cases"));
}

#[test]
fn visible_alerts_use_the_risk_level_field() {
    let out = run(42);
    let value = serde_json::to_value(&out.alerts).expect("alerts");
    let first = value
        .as_array()
        .and_then(|a| a.first())
        .expect("at least one alert");
    assert!(first.get("risk_level").is_some(), "alert JSON lacks risk_level: {first}");
    assert!(first.get("risk_tier").is_none(), "alert JSON exposes the internal field name");
}

#[test]
fn injected_and_baseline_transactions_look_alike() {
    let out = run(3);
    let mut injected_keys = BTreeSet::new();
    let mut baseline_keys = BTreeSet::new();
    for entry in out.ledger.entries() {
        let value = serde_json::to_value(&entry.txn).expect("txn");
        if entry.truth.is_suspicious {
            collect_keys(&value, &mut injected_keys);
        } else {
            collect_keys(&value, &mut baseline_keys);
        }
    }
    assert!(!injected_keys.is_empty(), "run injected nothing");
    assert_eq!(
        injected_keys, baseline_keys,
        "injected transactions have a different shape from baseline ones"
    );
}

#[test]
fn truth_view_covers_every_record() {
    let out = run(9);
    let truth = ground_truth_view(&out);
    assert_eq!(truth.transactions.len(), out.ledger.len());
    assert_eq!(truth.accounts.len(), out.population.accounts.len());
    assert_eq!(truth.alerts.len(), out.alerts.len());
    assert_eq!(truth.cases.len(), out.cases.len());

    let suspicious: usize = truth.accounts.iter().filter(|a| a.is_suspicious).count();
    assert!(
        suspicious >= out.registry.primary_accounts().len(),
        "fewer suspicious accounts ({suspicious}) than scenario primaries"
    );
}

#[test]
fn evaluation_view_joins_labels_by_id() {
    let out = run(21);
    let eval = evaluation_view(&out);
    assert_eq!(eval.alerts.len(), out.alerts.len());
    for (labeled, truth) in eval.alerts.iter().zip(&out.alert_truth) {
        assert_eq!(labeled.alert.alert_id, truth.alert_id, "alert and label order differ");
        assert_eq!(labeled.true_positive, truth.true_positive);
    }
    let value = serde_json::to_value(&eval.alerts).expect("labeled alerts");
    if let Some(first) = value.as_array().and_then(|a| a.first()) {
        assert!(first.get("alert_id").is_some(), "flattened alert fields missing");
        assert!(first.get("true_positive").is_some(), "label missing from evaluation view");
    }
}

#[test]
fn json_export_splits_visible_and_truth_directories() {
    let out = run(42);
    let dir = std::env::temp_dir().join(format!("amlsynth-json-{}", std::process::id()));
    write_json(&out, &dir).expect("write json");

    for file in ["transactions.json", "alerts.json", "cases.json", "signals.json"] {
        assert!(dir.join("visible").join(file).exists(), "visible/{file} missing");
    }
    for file in ["scenarios.json", "transaction_labels.json", "alert_labels.json"] {
        assert!(dir.join("ground_truth").join(file).exists(), "ground_truth/{file} missing");
    }
    let text = std::fs::read_to_string(dir.join("visible").join("transactions.json")).expect("read");
    let value: Value = serde_json::from_str(&text).expect("parse");
    assert_no_truth("transactions.json", value);
    assert!(dir.join("quality_report.json").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn json_export_replaces_the_directory_in_one_step() {
    let out = run(7);
    let root = std::env::temp_dir().join(format!("amlsynth-swap-{}", std::process::id()));
    let dir = root.join("export");
    let staging = root.join(".export.partial");
    let previous = root.join(".export.previous");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("stale.json"), "{}").expect("stale file");
    std::fs::create_dir_all(staging.join("visible")).expect("leftover staging");
    std::fs::write(staging.join("visible").join("junk.json"), "[]").expect("junk");

    write_json(&out, &dir).expect("write json");

    assert!(!dir.join("stale.json").exists(), "old export leaked into the new one");
    assert!(!dir.join("visible").join("junk.json").exists(), "leftover staging was published");
    assert!(dir.join("visible").join("alerts.json").exists());
    assert!(dir.join("ground_truth").join("case_labels.json").exists());
    assert!(dir.join("quality_report.json").exists());
    assert!(!staging.exists(), "staging directory left behind");
    assert!(!previous.exists(), "previous export left behind");

    let _ = std::fs::remove_dir_all(&root);
}

