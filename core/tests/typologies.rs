//! Typology injection: pattern parameters, registry consistency and
//! eligibility shortfalls.

use amlsynth_core::{
    clock::SimCalendar,
    config::{GeneratorConfig, InjectionPlan, SelectionPolicy, Span},
    engine::{GenerationEngine, GenerationOutput},
    population_subsystem::PopulationSubsystem,
    registry::Scenario,
    rng::RngBank,
    transaction::Transaction,
    types::{Direction, RiskTier, TxnKind, Typology},
    typology_subsystem::TypologySubsystem,
};
use std::collections::{BTreeSet, HashMap};

fn config_with(plans: Vec<InjectionPlan>) -> GeneratorConfig {
    let mut config = GeneratorConfig::default_test().expect("config");
    config.injections = plans;
    config
}

fn only(typology: Typology, selection: SelectionPolicy, prevalence: f64) -> Vec<InjectionPlan> {
    vec![InjectionPlan {
        typology,
        selection,
        prevalence,
    }]
}

fn run(run_id: &str, config: GeneratorConfig) -> GenerationOutput {
    GenerationEngine::build(run_id.into(), config)
        .expect("engine")
        .run()
        .expect("run")
}

fn by_id(out: &GenerationOutput) -> HashMap<&str, &Transaction> {
    out.ledger
        .transactions()
        .map(|t| (t.txn_id.as_str(), t))
        .collect()
}

fn scenarios_of(out: &GenerationOutput, typology: Typology) -> Vec<&Scenario> {
    let scenarios: Vec<&Scenario> = out
        .registry
        .scenarios()
        .iter()
        .filter(|s| s.typology == typology)
        .collect();
    assert!(!scenarios.is_empty(), "no {typology} scenarios injected");
    scenarios
}

fn legs<'a>(txns: &HashMap<&str, &'a Transaction>, scenario: &Scenario) -> Vec<&'a Transaction> {
    scenario
        .transaction_ids
        .iter()
        .map(|id| txns[id.as_str()])
        .collect()
}

#[test]
fn scenario_transactions_exist_with_matching_labels() {
    let out = GenerationEngine::build_test(42)
        .expect("engine")
        .run()
        .expect("run");
    assert!(!out.registry.is_empty(), "default tables should inject scenarios");

    let truth: HashMap<&str, _> = out
        .ledger
        .truths()
        .map(|t| (t.txn_id.as_str(), t))
        .collect();
    for scenario in out.registry.scenarios() {
        assert!(
            !scenario.transaction_ids.is_empty(),
            "scenario {} has no transactions",
            scenario.scenario_id
        );
        assert!(
            scenario.participants.contains(&scenario.primary_account),
            "scenario {} does not list its primary account",
            scenario.scenario_id
        );
        for txn_id in &scenario.transaction_ids {
            let label = truth
                .get(txn_id.as_str())
                .unwrap_or_else(|| panic!("scenario {} txn {txn_id} missing from ledger", scenario.scenario_id));
            assert!(label.is_suspicious, "txn {txn_id} should be labelled suspicious");
            assert_eq!(label.typology, Some(scenario.typology), "txn {txn_id} typology");
            assert_eq!(
                label.scenario_id.as_deref(),
                Some(scenario.scenario_id.as_str()),
                "txn {txn_id} scenario link"
            );
        }
    }

    let injected = out.ledger.truths().filter(|t| t.is_suspicious).count();
    let registered: usize = out
        .registry
        .scenarios()
        .iter()
        .map(|s| s.transaction_ids.len())
        .sum();
    assert_eq!(injected, registered, "every injected txn belongs to exactly one scenario");
}

#[test]
fn baseline_transactions_carry_clean_labels() {
    let out = GenerationEngine::build_test(11)
        .expect("engine")
        .run()
        .expect("run");
    for label in out.ledger.truths().filter(|t| !t.is_suspicious) {
        assert!(
            label.typology.is_none() && label.scenario_id.is_none(),
            "clean txn {} carries a typology label",
            label.txn_id
        );
    }
    assert_eq!(out.report.injected_transactions, out.ledger.injected_count());
}

#[test]
fn structuring_amounts_sit_just_below_the_currency_threshold() {
    let config = config_with(only(Typology::Structuring, SelectionPolicy::Random, 0.05));
    let params = config.typologies.structuring.clone();
    let out = run("structuring-band", config.clone());
    let txns = by_id(&out);

    let scenarios: Vec<_> = out
        .registry
        .scenarios()
        .iter()
        .filter(|s| s.typology == Typology::Structuring)
        .collect();
    assert!(!scenarios.is_empty(), "no structuring scenarios injected");

    for scenario in scenarios {
        let n = scenario.transaction_ids.len() as u32;
        assert!(
            n >= params.transactions.min && n <= params.transactions.max,
            "scenario {} has {n} deposits",
            scenario.scenario_id
        );
        for txn_id in &scenario.transaction_ids {
            let txn = txns[txn_id.as_str()];
            let threshold = config.reporting_threshold(&txn.currency);
            assert!(
                txn.amount >= threshold - params.margin && txn.amount < threshold - params.small_offset + 0.01,
                "txn {} amount {} {} outside [{}, {})",
                txn.txn_id,
                txn.amount,
                txn.currency,
                threshold - params.margin,
                threshold - params.small_offset
            );
            assert!(txn.amount < threshold, "txn {} reaches the threshold", txn.txn_id);
            assert!(txn.kind.is_cash(), "txn {} is not cash", txn.txn_id);
            assert_eq!(txn.direction, Direction::Credit, "txn {} direction", txn.txn_id);
        }
    }
}

#[test]
fn rapid_movement_never_moves_out_more_than_came_in() {
    let mut config = config_with(only(Typology::RapidMovement, SelectionPolicy::Random, 0.05));
    config.typologies.rapid_movement.retention = Span { min: 0.99, max: 0.99 };
    let out = run("rapid-retention", config);
    let txns = by_id(&out);

    let scenarios: Vec<_> = out
        .registry
        .scenarios()
        .iter()
        .filter(|s| s.typology == Typology::RapidMovement)
        .collect();
    assert!(!scenarios.is_empty(), "no rapid movement scenarios injected");

    for scenario in scenarios {
        let (mut inbound, mut outbound) = (0.0, 0.0);
        for txn_id in &scenario.transaction_ids {
            let txn = txns[txn_id.as_str()];
            match txn.direction {
                Direction::Credit => inbound += txn.amount,
                Direction::Debit => outbound += txn.amount,
            }
        }
        assert!(
            outbound <= inbound + 1e-6,
            "scenario {} moved out {outbound:.2} against {inbound:.2} in",
            scenario.scenario_id
        );
    }
}

#[test]
fn placement_prefers_the_detection_window() {
    let mut config = config_with(only(Typology::Structuring, SelectionPolicy::Random, 0.05));
    config.typologies.placement.recent_share = 1.0;
    let window = config.signals.short_window_days as i64;
    let out = run("placement-recent", config);
    let window_start = out.as_of - chrono::Duration::days(window - 1);

    for scenario in out.registry.scenarios() {
        let account = out
            .population
            .account(&scenario.primary_account)
            .expect("primary account");
        let open_through_window = account.open_date <= window_start
            && account.close_date.map_or(true, |c| c > out.as_of);
        if open_through_window {
            assert!(
                scenario.start.date() >= window_start,
                "scenario {} starts {} before the window {}",
                scenario.scenario_id,
                scenario.start,
                window_start
            );
        }
    }
}

#[test]
fn impossible_prevalence_records_a_shortfall() {
    let config = config_with(only(Typology::Mule, SelectionPolicy::NewAccounts, 1.0));
    let out = run("mule-shortfall", config);
    assert!(
        out.report
            .shortfalls
            .iter()
            .any(|s| s.context == "typology:mule" && s.available < s.requested),
        "expected a mule shortfall, got {:?}",
        out.report.shortfalls
    );
    assert!(out.report.has_warnings());
    assert!(
        out.events.iter().any(|e| e.event_type == "eligibility_shortfall"),
        "shortfall was not written to the event log"
    );
}

#[test]
fn zero_prevalence_injects_nothing() {
    let config = config_with(only(Typology::Cycle, SelectionPolicy::HighRisk, 0.0));
    let out = run("cycle-none", config);
    assert!(out.registry.is_empty(), "zero prevalence still injected scenarios");
    assert_eq!(out.ledger.injected_count(), 0);
}

fn assert_fan(typology: Typology, direction: Direction) {
    let config = config_with(only(typology, SelectionPolicy::Random, 0.05));
    let params = match typology {
        Typology::FanIn => config.typologies.fan_in.clone(),
        _ => config.typologies.fan_out.clone(),
    };
    let out = run(&format!("{typology}-shape"), config);
    let txns = by_id(&out);
    let max_ratio = (1.0 + params.amount_variance) / (1.0 - params.amount_variance);

    for scenario in scenarios_of(&out, typology) {
        let legs = legs(&txns, scenario);
        let n = legs.len() as u32;
        assert!(
            n >= params.counterparties.min && n <= params.counterparties.max,
            "scenario {} has {n} legs",
            scenario.scenario_id
        );
        let distinct: BTreeSet<&str> = legs.iter().map(|t| t.counterparty_id.as_str()).collect();
        assert_eq!(distinct.len(), legs.len(), "scenario {} reuses a counterparty", scenario.scenario_id);

        let first = legs.iter().map(|t| t.timestamp.date()).min().expect("legs");
        let last = legs.iter().map(|t| t.timestamp.date()).max().expect("legs");
        assert!(
            (last - first).num_days() < params.timeframe_days.max as i64,
            "scenario {} spans {first}..{last}",
            scenario.scenario_id
        );

        let low = legs.iter().map(|t| t.amount).fold(f64::INFINITY, f64::min);
        let high = legs.iter().map(|t| t.amount).fold(0.0, f64::max);
        assert!(
            high / low <= max_ratio + 1e-3,
            "scenario {} amounts {low}..{high} vary too much",
            scenario.scenario_id
        );
        for txn in legs {
            assert_eq!(txn.direction, direction, "txn {} direction", txn.txn_id);
            assert_eq!(txn.account_id, scenario.primary_account, "txn {} account", txn.txn_id);
        }
    }
}

#[test]
fn fan_in_gathers_similar_credits_from_distinct_counterparties() {
    assert_fan(Typology::FanIn, Direction::Credit);
}

#[test]
fn fan_out_spreads_similar_debits_to_distinct_counterparties() {
    assert_fan(Typology::FanOut, Direction::Debit);
}

#[test]
fn cycle_closes_its_loop_with_decaying_hops() {
    let config = config_with(only(Typology::Cycle, SelectionPolicy::Random, 0.03));
    let params = config.typologies.cycle.clone();
    let out = run("cycle-shape", config);
    let txns = by_id(&out);

    for scenario in scenarios_of(&out, Typology::Cycle) {
        assert!(scenario.participants.len() >= 2, "scenario {} is not a loop", scenario.scenario_id);
        let debits: Vec<&Transaction> = legs(&txns, scenario)
            .into_iter()
            .filter(|t| t.direction == Direction::Debit)
            .collect();
        assert_eq!(debits.len(), scenario.participants.len(), "one hop per member");
        assert_eq!(debits[0].account_id, scenario.primary_account, "loop starts at the primary");

        for (i, hop) in debits.iter().enumerate() {
            let next = debits[(i + 1) % debits.len()];
            assert_eq!(hop.kind, TxnKind::InternalTransfer);
            assert_eq!(
                hop.counterparty_account.as_deref(),
                Some(next.account_id.as_str()),
                "scenario {} hop {i} does not feed the next member",
                scenario.scenario_id
            );
            if i > 0 {
                let ratio = hop.amount / debits[i - 1].amount;
                assert!(
                    ratio >= params.decay.min - 1e-4 && ratio <= params.decay.max + 1e-4,
                    "scenario {} hop {i} decays by {ratio:.4}",
                    scenario.scenario_id
                );
            }
        }
        let credits = legs(&txns, scenario)
            .into_iter()
            .filter(|t| t.direction == Direction::Credit)
            .count();
        assert_eq!(credits, debits.len(), "every hop is booked on both sides");
    }
}

#[test]
fn mule_runs_through_a_young_account_and_many_counterparties() {
    let config = config_with(only(Typology::Mule, SelectionPolicy::NewAccounts, 0.02));
    let params = config.typologies.mule.clone();
    let out = run("mule-shape", config);
    let txns = by_id(&out);

    for scenario in scenarios_of(&out, Typology::Mule) {
        let account = out
            .population
            .account(&scenario.primary_account)
            .expect("primary account");
        assert!(account.open_date >= out.start_date, "mule account {} predates the run", account.account_id);
        let earliest = account.open_date + chrono::Duration::days(params.account_age_days.min as i64);
        assert!(
            scenario.start.date() >= earliest,
            "scenario {} starts {} before the account is {} days old",
            scenario.scenario_id,
            scenario.start,
            params.account_age_days.min
        );

        let legs = legs(&txns, scenario);
        let counterparties: Vec<&str> = legs
            .iter()
            .filter(|t| !t.kind.is_cash())
            .map(|t| t.counterparty_id.as_str())
            .collect();
        let distinct: BTreeSet<&str> = counterparties.iter().copied().collect();
        assert_eq!(distinct.len(), counterparties.len(), "scenario {} reuses a counterparty", scenario.scenario_id);
        assert!(
            distinct.len() as u32 >= params.counterparties.min && distinct.len() as u32 <= params.counterparties.max,
            "scenario {} touches {} counterparties",
            scenario.scenario_id,
            distinct.len()
        );
        assert!(
            legs.iter().any(|t| t.kind == TxnKind::CashWithdrawal),
            "scenario {} never withdraws cash",
            scenario.scenario_id
        );
    }
}

#[test]
fn corridor_wires_land_in_configured_jurisdictions() {
    let config = config_with(only(Typology::HighRiskCorridor, SelectionPolicy::Random, 0.05));
    let params = config.typologies.high_risk_corridor.clone();
    let out = run("corridor-shape", config);
    let txns = by_id(&out);

    for scenario in scenarios_of(&out, Typology::HighRiskCorridor) {
        let legs = legs(&txns, scenario);
        let n = legs.len() as u32;
        assert!(n >= params.transactions.min && n <= params.transactions.max, "scenario {} has {n} wires", scenario.scenario_id);
        for txn in legs {
            assert_eq!(txn.direction, Direction::Debit, "txn {} direction", txn.txn_id);
            assert!(
                params.jurisdictions.contains(&txn.destination_country),
                "txn {} goes to {}",
                txn.txn_id,
                txn.destination_country
            );
            assert!(
                txn.amount >= params.amount.min && txn.amount <= params.amount.max,
                "txn {} amount {}",
                txn.txn_id,
                txn.amount
            );
        }
    }
}

#[test]
fn cash_intensive_deposits_are_near_threshold_or_small() {
    let config = config_with(only(Typology::CashIntensive, SelectionPolicy::Random, 0.05));
    let params = config.typologies.cash_intensive.clone();
    let out = run("cash-shape", config.clone());
    let txns = by_id(&out);

    for scenario in scenarios_of(&out, Typology::CashIntensive) {
        let legs = legs(&txns, scenario);
        let n = legs.len() as u32;
        assert!(n >= params.deposits.min && n <= params.deposits.max, "scenario {} has {n} deposits", scenario.scenario_id);
        for txn in legs {
            assert_eq!(txn.kind, TxnKind::CashDeposit, "txn {} kind", txn.txn_id);
            assert_eq!(txn.direction, Direction::Credit, "txn {} direction", txn.txn_id);
            let threshold = config.reporting_threshold(&txn.currency);
            let near = txn.amount >= threshold - params.near_threshold_gap.max - 0.01
                && txn.amount <= threshold - params.near_threshold_gap.min;
            let small = txn.amount >= params.small_amount.min && txn.amount <= params.small_amount.max;
            assert!(near || small, "txn {} amount {} {}", txn.txn_id, txn.amount, txn.currency);
        }
    }
}

#[test]
fn selection_policies_restrict_primary_accounts() {
    let mut config = GeneratorConfig::default_test().expect("config");
    config.injections = vec![
        InjectionPlan {
            typology: Typology::HighRiskCorridor,
            selection: SelectionPolicy::HighRisk,
            prevalence: 0.03,
        },
        InjectionPlan {
            typology: Typology::FanIn,
            selection: SelectionPolicy::NewAccounts,
            prevalence: 0.02,
        },
    ];
    let regions = config.regions.clone();
    let out = run("selection-policy", config);

    for scenario in scenarios_of(&out, Typology::HighRiskCorridor) {
        let account = out
            .population
            .account(&scenario.primary_account)
            .expect("primary account");
        let customer = out.population.customer(&account.customer_id).expect("customer");
        assert!(
            customer.risk_rating >= RiskTier::Medium
                || customer.is_pep
                || regions.is_high_risk(&account.country)
                || regions.is_offshore(&account.country),
            "scenario {} picked low-risk account {}",
            scenario.scenario_id,
            account.account_id
        );
    }
    for scenario in scenarios_of(&out, Typology::FanIn) {
        let account = out
            .population
            .account(&scenario.primary_account)
            .expect("primary account");
        assert!(
            account.open_date >= out.start_date,
            "scenario {} picked account {} opened {}",
            scenario.scenario_id,
            account.account_id,
            account.open_date
        );
    }
}

#[test]
fn requested_count_is_whole_part_plus_a_keyed_draw() {
    let config = GeneratorConfig::default_test().expect("config");
    let bank = RngBank::new(config.run.seed);
    let calendar = SimCalendar::new(config.run.start_date, config.run.end_date);
    let population = PopulationSubsystem::new(&config, bank, calendar)
        .generate()
        .expect("population");
    let accounts = population.accounts.len();
    let subsystem = TypologySubsystem::new(&config, bank, calendar, &population);
    let plan = |prevalence: f64| InjectionPlan {
        typology: Typology::FanIn,
        selection: SelectionPolicy::Random,
        prevalence,
    };

    assert_eq!(subsystem.requested_count(&plan(1.0)), accounts, "full prevalence takes every account");
    assert_eq!(subsystem.requested_count(&plan(0.0)), 0);

    let fractional = plan(2.5 / accounts as f64);
    let count = subsystem.requested_count(&fractional);
    assert!(count == 2 || count == 3, "expected 2 or 3, got {count}");
    assert_eq!(subsystem.requested_count(&fractional), count, "draw is keyed, not sequential");
}
