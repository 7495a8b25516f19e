//! The generation engine: one run, start to finish.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Population        customers, accounts, counterparties
//!   2. Baseline          normal activity per account
//!   3. Typology          injected scenarios, written to the registry
//!   4. Ledger            merge, then the lifecycle check
//!   5. News              adverse-media provider
//!   6. Graph             network provider over the visible ledger
//!   7. Signal            per-account records at the as-of date
//!   8. Alert             rules, calibration, ground-truth tagging
//!   9. Case              grouping and dispositions
//!  10. Report            quality report
//!
//! RULES:
//!   - Each stage consumes the complete output of the stages before it.
//!   - The scenario registry is passed explicitly. Only stage 3 writes it;
//!     stage 8 reads it, after tiers are final.
//!   - All randomness flows through the RngBank.
//!   - Any error aborts the run and no output is returned.

use crate::{
    alert_subsystem::{Alert, AlertSubsystem, AlertTruth},
    baseline_subsystem::BaselineSubsystem,
    case_subsystem::{Case, CaseOutcome, CaseSubsystem, CaseTruth},
    clock::SimCalendar,
    config::GeneratorConfig,
    error::{SimError, SimResult},
    event::{EventLog, EventLogEntry, PipelineEvent, Stage},
    graph::LedgerGraph,
    news::SyntheticNews,
    population_subsystem::{Population, PopulationSubsystem},
    registry::ScenarioRegistry,
    report::{QualityReport, Shortfall, TierDistribution},
    rng::RngBank,
    signal::SignalRecord,
    signal_subsystem::SignalSubsystem,
    transaction::Ledger,
    typology_subsystem::TypologySubsystem,
    types::{Day, RunId},
};

/// Everything a successful run produced.
#[derive(Debug)]
pub struct GenerationOutput {
    pub run_id: RunId,
    pub seed: u64,
    pub start_date: Day,
    pub end_date: Day,
    pub as_of: Day,
    pub population: Population,
    pub ledger: Ledger,
    pub registry: ScenarioRegistry,
    pub news: SyntheticNews,
    pub signals: Vec<SignalRecord>,
    pub alerts: Vec<Alert>,
    pub alert_truth: Vec<AlertTruth>,
    pub cases: Vec<Case>,
    pub case_truth: Vec<CaseTruth>,
    pub report: QualityReport,
    pub events: Vec<EventLogEntry>,
}

pub struct GenerationEngine {
    pub run_id: RunId,
    pub rng_bank: RngBank,
    pub calendar: SimCalendar,
    config: GeneratorConfig,
    events: EventLog,
}

impl GenerationEngine {
    /// Validate the configuration and wire up a run. Fails before any draw
    /// is made if a table is bad.
    pub fn build(run_id: RunId, config: GeneratorConfig) -> SimResult<Self> {
        config.validate()?;
        let calendar = SimCalendar::new(config.run.start_date, config.run.end_date);
        Ok(Self {
            rng_bank: RngBank::new(config.run.seed),
            calendar,
            events: EventLog::new(run_id.clone()),
            config,
            run_id,
        })
    }

    /// Small embedded configuration with the given seed.
    pub fn build_test(seed: u64) -> SimResult<Self> {
        let mut config = GeneratorConfig::default_test()?;
        config.run.seed = seed;
        Self::build(format!("test-{seed}"), config)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn as_of(&self) -> Day {
        self.config.run.as_of()
    }

    /// Execute every stage in order.
    pub fn run(mut self) -> SimResult<GenerationOutput> {
        let seed = self.config.run.seed;
        let as_of = self.as_of();
        log::info!(
            "run={} seed={seed} window={}..{} as_of={as_of}",
            self.run_id,
            self.calendar.start,
            self.calendar.end
        );
        self.emit(
            Stage::Engine,
            PipelineEvent::RunInitialized {
                run_id: self.run_id.clone(),
                seed,
                start: self.calendar.start,
                end: self.calendar.end,
                as_of,
            },
        )?;
        let mut shortfalls: Vec<Shortfall> = Vec::new();

        // 1. Population
        self.started(Stage::Population)?;
        let population = PopulationSubsystem::new(&self.config, self.rng_bank, self.calendar).generate()?;
        self.emit(
            Stage::Population,
            PipelineEvent::PopulationGenerated {
                customers: population.customers.len(),
                accounts: population.accounts.len(),
                counterparties: population.counterparties.len(),
            },
        )?;
        self.completed(Stage::Population, population.accounts.len())?;

        // 2. Baseline
        self.started(Stage::Baseline)?;
        let baseline =
            BaselineSubsystem::new(&self.config, self.rng_bank, self.calendar, &population).generate()?;
        let baseline_count = baseline.len();
        self.completed(Stage::Baseline, baseline_count)?;

        // 3. Typology
        self.started(Stage::Typology)?;
        let mut registry = ScenarioRegistry::new();
        let injection = TypologySubsystem::new(&self.config, self.rng_bank, self.calendar, &population)
            .inject(&mut registry)?;
        for scenario in registry.scenarios() {
            self.emit(
                Stage::Typology,
                PipelineEvent::ScenarioInjected {
                    scenario_id: scenario.scenario_id.clone(),
                    typology: scenario.typology,
                    transactions: scenario.transaction_ids.len(),
                },
            )?;
        }
        for shortfall in &injection.shortfalls {
            self.shortfall(Stage::Typology, shortfall)?;
        }
        shortfalls.extend(injection.shortfalls);
        self.completed(Stage::Typology, registry.len())?;

        // 4. Ledger
        self.started(Stage::Ledger)?;
        let ledger = Ledger::merge(baseline, injection.entries);
        if let Some(txn) = ledger.first_lifecycle_violation(&population) {
            log::error!(
                "stage=ledger lifecycle violation txn={} account={}",
                txn.txn_id,
                txn.account_id
            );
            return Err(SimError::TemporalInconsistency {
                txn_id: txn.txn_id.clone(),
                account_id: txn.account_id.clone(),
                timestamp: txn.timestamp.to_string(),
            });
        }
        self.completed(Stage::Ledger, ledger.len())?;

        // 5. News
        self.started(Stage::News)?;
        let news = SyntheticNews::generate(&population, &self.config.population, self.rng_bank, self.calendar);
        self.completed(Stage::News, news.len())?;

        // 6. Graph
        self.started(Stage::Graph)?;
        let graph = LedgerGraph::build(&ledger, &population, &self.config.regions, as_of);
        self.completed(Stage::Graph, graph.node_count())?;

        // 7. Signal
        self.started(Stage::Signal)?;
        let signals = SignalSubsystem::new(&self.config, self.rng_bank, &population, &graph, &news)
            .compute_all(&ledger.visible_by_account(as_of), as_of);
        self.completed(Stage::Signal, signals.len())?;

        // 8. Alert
        self.started(Stage::Alert)?;
        let rules = self.config.compile_rules()?;
        let batch = AlertSubsystem::new(&self.config, &rules, self.rng_bank).run(&signals, &registry);
        self.emit(
            Stage::Alert,
            PipelineEvent::CalibrationApplied {
                promoted: batch.calibration.promoted,
                fillers: batch.calibration.fillers.len(),
                demoted: batch.calibration.demoted,
                retiered: batch.calibration.retiered,
            },
        )?;
        if let Some(shortfall) = &batch.calibration.shortfall {
            self.shortfall(Stage::Alert, shortfall)?;
            shortfalls.push(shortfall.clone());
        }
        self.completed(Stage::Alert, batch.alerts.len())?;

        // 9. Case
        self.started(Stage::Case)?;
        let mut alerts = batch.alerts;
        let alert_truth = batch.truth;
        let filler_alerts = batch.calibration.fillers.len();
        let outcome = CaseSubsystem::new(&self.config, self.rng_bank).simulate(&mut alerts, &alert_truth, as_of);
        self.emit(
            Stage::Case,
            PipelineEvent::CasesSimulated {
                opened: outcome.cases.len(),
                still_open: outcome.still_open(),
            },
        )?;
        self.completed(Stage::Case, outcome.cases.len())?;

        // 10. Report
        self.started(Stage::Report)?;
        let report = self.report(ReportInputs {
            population: &population,
            baseline_count,
            ledger: &ledger,
            registry: &registry,
            news: &news,
            signals: signals.len(),
            alerts: &alerts,
            alert_truth: &alert_truth,
            filler_alerts,
            outcome: &outcome,
            shortfalls,
        });
        if !report.alerts.within_tolerance {
            log::warn!(
                "stage=report tier mix outside tolerance max_deviation={:.3}",
                report.alerts.max_deviation
            );
        }
        self.completed(Stage::Report, 1)?;
        self.emit(
            Stage::Engine,
            PipelineEvent::RunCompleted {
                alerts: alerts.len(),
                cases: outcome.cases.len(),
                warnings: report.has_warnings(),
            },
        )?;

        Ok(GenerationOutput {
            run_id: self.run_id,
            seed,
            start_date: self.calendar.start,
            end_date: self.calendar.end,
            as_of,
            population,
            ledger,
            registry,
            news,
            signals,
            alerts,
            alert_truth,
            cases: outcome.cases,
            case_truth: outcome.truth,
            report,
            events: self.events.into_entries(),
        })
    }

    fn emit(&mut self, stage: Stage, event: PipelineEvent) -> SimResult<()> {
        self.events.record(stage, &event)?;
        Ok(())
    }

    fn started(&mut self, stage: Stage) -> SimResult<()> {
        log::debug!("stage={} started", stage.as_str());
        self.emit(stage, PipelineEvent::StageStarted { stage })
    }

    fn completed(&mut self, stage: Stage, records: usize) -> SimResult<()> {
        log::debug!("stage={} completed records={records}", stage.as_str());
        self.emit(stage, PipelineEvent::StageCompleted { stage, records })
    }

    fn shortfall(&mut self, stage: Stage, shortfall: &Shortfall) -> SimResult<()> {
        self.emit(
            stage,
            PipelineEvent::EligibilityShortfall {
                context: shortfall.context.clone(),
                requested: shortfall.requested,
                available: shortfall.available,
            },
        )
    }

    fn report(&self, inputs: ReportInputs<'_>) -> QualityReport {
        let calibration = &self.config.calibration;
        let alerts = TierDistribution::measure(
            inputs.alerts.iter().map(|a| a.risk_tier),
            &calibration.targets,
            calibration.tolerance,
        );
        let true_positive_alerts = inputs.alert_truth.iter().filter(|t| t.true_positive).count();
        let false_positive_alerts = inputs.alert_truth.len() - true_positive_alerts;
        let precision = if inputs.alert_truth.is_empty() {
            0.0
        } else {
            true_positive_alerts as f64 / inputs.alert_truth.len() as f64
        };
        QualityReport {
            run_id: self.run_id.clone(),
            seed: self.config.run.seed,
            as_of: self.as_of(),
            customers: inputs.population.customers.len(),
            accounts: inputs.population.accounts.len(),
            counterparties: inputs.population.counterparties.len(),
            baseline_transactions: inputs.baseline_count,
            injected_transactions: inputs.ledger.injected_count(),
            scenarios_by_typology: inputs.registry.count_by_typology(),
            news_items: inputs.news.len(),
            signal_records: inputs.signals,
            alerts,
            filler_alerts: inputs.filler_alerts,
            true_positive_alerts,
            false_positive_alerts,
            precision,
            cases_opened: inputs.outcome.cases.len(),
            cases_still_open: inputs.outcome.still_open(),
            dispositions: inputs.outcome.dispositions(),
            shortfalls: inputs.shortfalls,
        }
    }
}

struct ReportInputs<'a> {
    population: &'a Population,
    baseline_count: usize,
    ledger: &'a Ledger,
    registry: &'a ScenarioRegistry,
    news: &'a SyntheticNews,
    signals: usize,
    alerts: &'a [Alert],
    alert_truth: &'a [AlertTruth],
    filler_alerts: usize,
    outcome: &'a CaseOutcome,
    shortfalls: Vec<Shortfall>,
}
