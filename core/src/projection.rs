//! Visible and ground-truth projections of a finished run.
//!
//! RULE: `VisibleView` holds only what a monitoring system could see.
//! `GroundTruthView` holds the hidden labels. The two are joined in one
//! place only, `evaluation_view`, for scoring detectors against truth.

use crate::{
    alert_subsystem::{Alert, AlertTruth},
    case_subsystem::{Case, CaseTruth},
    engine::GenerationOutput,
    error::{SimError, SimResult},
    news::NewsItem,
    population_subsystem::{Account, Counterparty, Customer},
    registry::{Scenario, ScenarioRegistry},
    signal::SignalRecord,
    transaction::{Transaction, TxnTruth},
    types::{EntityId, Typology},
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct VisibleView<'a> {
    pub customers: &'a [Customer],
    pub accounts: &'a [Account],
    pub counterparties: &'a [Counterparty],
    pub transactions: Vec<&'a Transaction>,
    pub news: Vec<&'a NewsItem>,
    pub signals: &'a [SignalRecord],
    pub alerts: &'a [Alert],
    pub cases: &'a [Case],
}

/// Per-account label derived from the scenario registry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AccountTruth {
    pub account_id: EntityId,
    pub is_suspicious: bool,
    pub typologies: Vec<Typology>,
    pub scenario_ids: Vec<EntityId>,
}

#[derive(Debug, Serialize)]
pub struct GroundTruthView<'a> {
    pub scenarios: &'a [Scenario],
    pub transactions: Vec<&'a TxnTruth>,
    pub accounts: Vec<AccountTruth>,
    pub alerts: &'a [AlertTruth],
    pub cases: &'a [CaseTruth],
}

#[derive(Debug, Serialize)]
pub struct LabeledTransaction<'a> {
    #[serde(flatten)]
    pub transaction: &'a Transaction,
    pub is_suspicious: bool,
    pub typology: Option<Typology>,
    pub scenario_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct LabeledAlert<'a> {
    #[serde(flatten)]
    pub alert: &'a Alert,
    pub true_positive: bool,
    pub typology: Option<Typology>,
    pub scenario_id: Option<&'a str>,
    pub calibration_filler: bool,
}

#[derive(Debug, Serialize)]
pub struct LabeledCase<'a> {
    #[serde(flatten)]
    pub case: &'a Case,
    pub contains_true_positive: bool,
    pub scenario_ids: &'a [EntityId],
}

#[derive(Debug, Serialize)]
pub struct EvaluationView<'a> {
    pub transactions: Vec<LabeledTransaction<'a>>,
    pub alerts: Vec<LabeledAlert<'a>>,
    pub cases: Vec<LabeledCase<'a>>,
}

pub fn visible_view(output: &GenerationOutput) -> VisibleView<'_> {
    VisibleView {
        customers: &output.population.customers,
        accounts: &output.population.accounts,
        counterparties: &output.population.counterparties,
        transactions: output.ledger.transactions().collect(),
        news: output.news.items().collect(),
        signals: &output.signals,
        alerts: &output.alerts,
        cases: &output.cases,
    }
}

pub fn ground_truth_view(output: &GenerationOutput) -> GroundTruthView<'_> {
    GroundTruthView {
        scenarios: output.registry.scenarios(),
        transactions: output.ledger.truths().collect(),
        accounts: account_truth(&output.population.accounts, &output.registry),
        alerts: &output.alert_truth,
        cases: &output.case_truth,
    }
}

/// One label per account, in account order.
pub fn account_truth(accounts: &[Account], registry: &ScenarioRegistry) -> Vec<AccountTruth> {
    let index = registry.participant_index();
    accounts
        .iter()
        .map(|account| {
            let scenarios = index.get(account.account_id.as_str());
            let typologies: BTreeSet<Typology> = scenarios
                .into_iter()
                .flatten()
                .map(|s| s.typology)
                .collect();
            let scenario_ids: Vec<EntityId> = scenarios
                .into_iter()
                .flatten()
                .map(|s| s.scenario_id.clone())
                .collect();
            AccountTruth {
                account_id: account.account_id.clone(),
                is_suspicious: !scenario_ids.is_empty(),
                typologies: typologies.into_iter().collect(),
                scenario_ids,
            }
        })
        .collect()
}

/// Visible records joined with their labels.
pub fn evaluation_view(output: &GenerationOutput) -> EvaluationView<'_> {
    let transactions = output
        .ledger
        .entries()
        .iter()
        .map(|entry| LabeledTransaction {
            transaction: &entry.txn,
            is_suspicious: entry.truth.is_suspicious,
            typology: entry.truth.typology,
            scenario_id: entry.truth.scenario_id.as_deref(),
        })
        .collect();

    let alert_labels: HashMap<&str, &AlertTruth> = output
        .alert_truth
        .iter()
        .map(|t| (t.alert_id.as_str(), t))
        .collect();
    let alerts = output
        .alerts
        .iter()
        .map(|alert| {
            let label = alert_labels.get(alert.alert_id.as_str());
            LabeledAlert {
                alert,
                true_positive: label.map_or(false, |t| t.true_positive),
                typology: label.and_then(|t| t.typology),
                scenario_id: label.and_then(|t| t.scenario_id.as_deref()),
                calibration_filler: label.map_or(false, |t| t.calibration_filler),
            }
        })
        .collect();

    let case_labels: HashMap<&str, &CaseTruth> = output
        .case_truth
        .iter()
        .map(|t| (t.case_id.as_str(), t))
        .collect();
    let cases = output
        .cases
        .iter()
        .map(|case| {
            let label = case_labels.get(case.case_id.as_str());
            LabeledCase {
                case,
                contains_true_positive: label.map_or(false, |t| t.contains_true_positive),
                scenario_ids: label.map_or(&[][..], |t| t.scenario_ids.as_slice()),
            }
        })
        .collect();

    EvaluationView {
        transactions,
        alerts,
        cases,
    }
}

/// Write the run as JSON files under `dir`:
/// `visible/`, `ground_truth/` and `quality_report.json`.
///
/// Files are staged in a sibling `.<name>.partial` directory that is renamed
/// over `dir` only once every file is written, so a failed export leaves any
/// previous export untouched. An existing `dir` is replaced as a whole.
pub fn write_json(output: &GenerationOutput, dir: &Path) -> SimResult<()> {
    let staging = sibling(dir, "partial")?;
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    if let Err(err) = write_tree(output, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    if dir.exists() {
        let previous = sibling(dir, "previous")?;
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }
        fs::rename(dir, &previous)?;
        fs::rename(&staging, dir)?;
        fs::remove_dir_all(&previous)?;
    } else {
        fs::rename(&staging, dir)?;
    }
    log::debug!("projection: json export published at {}", dir.display());
    Ok(())
}

/// `<parent>/.<name>.<suffix>`, next to `dir` so the final rename stays on
/// one filesystem.
fn sibling(dir: &Path, suffix: &str) -> SimResult<PathBuf> {
    let name = dir
        .file_name()
        .ok_or_else(|| SimError::config(format!("json export path {} has no directory name", dir.display())))?;
    let parent = dir.parent().unwrap_or_else(|| Path::new(""));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
    }
    Ok(parent.join(format!(".{}.{suffix}", name.to_string_lossy())))
}

fn write_tree(output: &GenerationOutput, dir: &Path) -> SimResult<()> {
    let visible = visible_view(output);
    let truth = ground_truth_view(output);

    let visible_dir = dir.join("visible");
    let truth_dir = dir.join("ground_truth");
    fs::create_dir_all(&visible_dir)?;
    fs::create_dir_all(&truth_dir)?;

    write_file(&visible_dir, "customers.json", &visible.customers)?;
    write_file(&visible_dir, "accounts.json", &visible.accounts)?;
    write_file(&visible_dir, "counterparties.json", &visible.counterparties)?;
    write_file(&visible_dir, "transactions.json", &visible.transactions)?;
    write_file(&visible_dir, "news.json", &visible.news)?;
    write_file(&visible_dir, "signals.json", &visible.signals)?;
    write_file(&visible_dir, "alerts.json", &visible.alerts)?;
    write_file(&visible_dir, "cases.json", &visible.cases)?;

    write_file(&truth_dir, "scenarios.json", &truth.scenarios)?;
    write_file(&truth_dir, "transaction_labels.json", &truth.transactions)?;
    write_file(&truth_dir, "account_labels.json", &truth.accounts)?;
    write_file(&truth_dir, "alert_labels.json", &truth.alerts)?;
    write_file(&truth_dir, "case_labels.json", &truth.cases)?;

    write_file(dir, "quality_report.json", &output.report)?;
    Ok(())
}

fn write_file<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> SimResult<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(dir.join(name), text)?;
    Ok(())
}
