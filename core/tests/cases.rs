//! Case grouping and disposition timing.

use amlsynth_core::{
    config::GeneratorConfig,
    engine::{GenerationEngine, GenerationOutput},
    types::{CaseStatus, Disposition, RiskTier},
};
use chrono::Timelike;
use std::collections::{BTreeMap, BTreeSet, HashMap};

fn run(seed: u64) -> GenerationOutput {
    GenerationEngine::build_test(seed)
        .expect("engine")
        .run()
        .expect("run")
}

fn run_with(run_id: &str, config: GeneratorConfig) -> GenerationOutput {
    GenerationEngine::build(run_id.into(), config)
        .expect("engine")
        .run()
        .expect("run")
}

#[test]
fn cases_open_within_the_configured_delay() {
    let out = run(42);
    let config = GeneratorConfig::default_test().expect("config");
    let delay = config.cases.open_delay_days;
    assert!(!out.cases.is_empty(), "no cases opened");
    for case in &out.cases {
        let waited = (case.opened_at.date() - out.as_of).num_days();
        assert!(
            waited >= delay.min as i64 && waited <= delay.max as i64,
            "case {} opened {waited} days after as-of",
            case.case_id
        );
        assert!(
            (9..17).contains(&case.opened_at.hour()),
            "case {} opened outside working hours at {}",
            case.case_id,
            case.opened_at
        );
    }
}

#[test]
fn closed_cases_carry_a_disposition_and_duration() {
    let out = run(7);
    let config = GeneratorConfig::default_test().expect("config");
    let span = config.cases.investigation_days;
    for case in &out.cases {
        match case.status {
            CaseStatus::Closed => {
                let days = case.investigation_days().expect("closed case has a duration");
                assert!(
                    days >= span.min as i64 && days <= span.max as i64,
                    "case {} investigated for {days} days",
                    case.case_id
                );
                assert!(case.disposition.is_some(), "closed case {} lacks a disposition", case.case_id);
            }
            CaseStatus::Open => {
                assert!(case.closed_at.is_none(), "open case {} has a close time", case.case_id);
                assert!(case.disposition.is_none());
            }
        }
        assert_eq!(
            case.sar_filed,
            case.disposition == Some(Disposition::FiledSar),
            "case {} SAR flag disagrees with disposition",
            case.case_id
        );
    }
}

#[test]
fn every_escalated_customer_gets_one_case() {
    let out = run(42);
    let mut per_customer: BTreeMap<&str, usize> = BTreeMap::new();
    for case in &out.cases {
        *per_customer.entry(case.customer_id.as_str()).or_insert(0) += 1;
    }
    assert!(per_customer.values().all(|n| *n == 1), "a customer has more than one case");

    let escalated: BTreeSet<&str> = out
        .alerts
        .iter()
        .filter(|a| a.risk_tier != RiskTier::Low)
        .map(|a| a.customer_id.as_str())
        .collect();
    for customer in escalated {
        assert!(
            per_customer.contains_key(customer),
            "customer {customer} has a non-low alert but no case"
        );
    }
}

#[test]
fn case_links_and_priority_agree_with_alerts() {
    let out = run(3);
    let alerts: HashMap<&str, _> = out.alerts.iter().map(|a| (a.alert_id.as_str(), a)).collect();
    for case in &out.cases {
        assert!(!case.alert_ids.is_empty(), "case {} has no alerts", case.case_id);
        let mut sorted = case.alert_ids.clone();
        sorted.sort();
        assert_eq!(sorted, case.alert_ids, "case {} alert ids unsorted", case.case_id);

        let mut highest = RiskTier::Low;
        for alert_id in &case.alert_ids {
            let alert = alerts[alert_id.as_str()];
            assert_eq!(alert.customer_id, case.customer_id);
            assert_eq!(alert.case_id.as_deref(), Some(case.case_id.as_str()));
            highest = highest.max(alert.risk_tier);
        }
        assert_eq!(case.priority, highest, "case {} priority", case.case_id);
    }

    let linked: usize = out.cases.iter().map(|c| c.alert_ids.len()).sum();
    let with_case = out.alerts.iter().filter(|a| a.case_id.is_some()).count();
    assert_eq!(linked, with_case, "alerts point at cases that do not list them");
}

#[test]
fn case_truth_mirrors_alert_truth() {
    let out = run(42);
    let alert_truth: HashMap<&str, _> = out
        .alert_truth
        .iter()
        .map(|t| (t.alert_id.as_str(), t))
        .collect();
    assert_eq!(out.cases.len(), out.case_truth.len());
    for (case, truth) in out.cases.iter().zip(&out.case_truth) {
        assert_eq!(case.case_id, truth.case_id);
        let any_tp = case
            .alert_ids
            .iter()
            .any(|id| alert_truth[id.as_str()].true_positive);
        assert_eq!(truth.contains_true_positive, any_tp, "case {}", case.case_id);
    }
}

#[test]
fn short_horizon_leaves_cases_open() {
    let mut config = GeneratorConfig::default_test().expect("config");
    config.cases.review_horizon_days = 0;
    config.cases.open_delay_days.min = 1;
    config.cases.open_delay_days.max = 1;
    let out = run_with("short-horizon", config);
    assert!(!out.cases.is_empty());
    for case in &out.cases {
        assert_eq!(case.status, CaseStatus::Open, "case {} closed past the horizon", case.case_id);
        assert!(!case.sar_filed);
    }
    assert_eq!(out.report.cases_still_open, out.cases.len());
}

#[test]
fn low_only_customers_never_get_cases_at_zero_probability() {
    let mut config = GeneratorConfig::default_test().expect("config");
    config.cases.low_tier_case_probability = 0.0;
    let out = run_with("no-low-cases", config);
    for case in &out.cases {
        assert_ne!(case.priority, RiskTier::Low, "low-only case {} opened", case.case_id);
    }
}
