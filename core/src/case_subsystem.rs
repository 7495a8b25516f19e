//! Case and disposition simulator.
//!
//! Alerts are grouped by customer. A customer whose alerts are all low
//! tier only gets a case some of the time. Each opened case draws an
//! analyst disposition from the table for (contains a true positive,
//! highest alert tier), so outcomes track ground truth imperfectly.
//!
//! Ground truth is consulted only to choose the disposition table; the
//! visible case never carries it.

use crate::{
    alert_subsystem::{Alert, AlertTruth},
    clock::{add_days, at},
    config::{DispositionWeights, GeneratorConfig},
    rng::{RngBank, StageSlot, SubsystemRng},
    types::{CaseStatus, Day, Disposition, EntityId, RiskTier, Timestamp},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Analysts open cases between these hours.
const WORKING_HOURS: (u64, u64) = (9, 17);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Case {
    pub case_id: EntityId,
    pub customer_id: EntityId,
    pub alert_ids: Vec<EntityId>,
    /// Highest tier among the linked alerts.
    pub priority: RiskTier,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
    pub status: CaseStatus,
    pub disposition: Option<Disposition>,
    pub sar_filed: bool,
}

impl Case {
    pub fn investigation_days(&self) -> Option<i64> {
        self.closed_at.map(|closed| (closed - self.opened_at).num_days())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseTruth {
    pub case_id: EntityId,
    pub contains_true_positive: bool,
    pub scenario_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Default)]
pub struct CaseOutcome {
    pub cases: Vec<Case>,
    pub truth: Vec<CaseTruth>,
}

impl CaseOutcome {
    pub fn still_open(&self) -> usize {
        self.cases.iter().filter(|c| c.status == CaseStatus::Open).count()
    }

    pub fn dispositions(&self) -> BTreeMap<Disposition, usize> {
        let mut counts = BTreeMap::new();
        for disposition in self.cases.iter().filter_map(|c| c.disposition) {
            *counts.entry(disposition).or_insert(0) += 1;
        }
        counts
    }
}

pub struct CaseSubsystem<'a> {
    config: &'a GeneratorConfig,
    rng_bank: RngBank,
}

impl<'a> CaseSubsystem<'a> {
    pub fn new(config: &'a GeneratorConfig, rng_bank: RngBank) -> Self {
        Self { config, rng_bank }
    }

    /// Open cases over `alerts` and write each case id back onto its alerts.
    /// `truth` carries the hidden labels of `alerts`.
    pub fn simulate(&self, alerts: &mut [Alert], truth: &[AlertTruth], as_of: Day) -> CaseOutcome {
        let truth_by_alert: HashMap<&str, &AlertTruth> =
            truth.iter().map(|t| (t.alert_id.as_str(), t)).collect();

        let mut by_customer: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, alert) in alerts.iter().enumerate() {
            by_customer.entry(alert.customer_id.as_str()).or_default().push(i);
        }

        let mut outcome = CaseOutcome::default();
        let mut assignments: Vec<(usize, EntityId)> = Vec::new();
        for (customer_id, members) in &by_customer {
            let mut rng = self.rng_bank.stream(StageSlot::Case, customer_id, "case");
            let priority = members
                .iter()
                .map(|&i| alerts[i].risk_tier)
                .max()
                .unwrap_or(RiskTier::Low);
            if priority == RiskTier::Low && !rng.chance(self.config.cases.low_tier_case_probability) {
                continue;
            }

            let linked: Vec<&AlertTruth> = members
                .iter()
                .filter_map(|&i| truth_by_alert.get(alerts[i].alert_id.as_str()).copied())
                .collect();
            let contains_true_positive = linked.iter().any(|t| t.true_positive);
            let scenario_ids: BTreeSet<EntityId> =
                linked.iter().filter_map(|t| t.scenario_id.clone()).collect();

            let case = self.open_case(&mut rng, customer_id, members, alerts, priority, contains_true_positive, as_of);
            for &i in members {
                assignments.push((i, case.case_id.clone()));
            }
            outcome.truth.push(CaseTruth {
                case_id: case.case_id.clone(),
                contains_true_positive,
                scenario_ids: scenario_ids.into_iter().collect(),
            });
            outcome.cases.push(case);
        }

        let customers = by_customer.len();
        for (i, case_id) in assignments {
            alerts[i].case_id = Some(case_id);
        }
        log::info!(
            "stage=case customers={customers} cases={} open={}",
            outcome.cases.len(),
            outcome.still_open()
        );
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn open_case(
        &self,
        rng: &mut SubsystemRng,
        customer_id: &str,
        members: &[usize],
        alerts: &[Alert],
        priority: RiskTier,
        true_positive: bool,
        as_of: Day,
    ) -> Case {
        let cfg = &self.config.cases;
        let delay = rng.range_inclusive(cfg.open_delay_days.min as u64, cfg.open_delay_days.max as u64);
        let hour = rng.range_inclusive(WORKING_HOURS.0, WORKING_HOURS.1 - 1) as u32;
        let minute = rng.range_inclusive(0, 59) as u32;
        let opened_at = at(add_days(as_of, delay as i64), hour, minute);
        let investigation =
            rng.range_inclusive(cfg.investigation_days.min as u64, cfg.investigation_days.max as u64);
        let closes_at = opened_at + Duration::days(investigation as i64);

        let case_id = format!("CASE_{}", rng.uuid().simple());
        let horizon = add_days(as_of, cfg.review_horizon_days as i64);
        let table = if true_positive {
            &cfg.dispositions.true_positive
        } else {
            &cfg.dispositions.false_positive
        };
        let disposition = table.get(&priority).and_then(|weights| draw_disposition(rng, weights));

        let mut alert_ids: Vec<EntityId> = members.iter().map(|&i| alerts[i].alert_id.clone()).collect();
        alert_ids.sort();

        match disposition {
            Some(disposition) if closes_at.date() <= horizon => Case {
                case_id,
                customer_id: customer_id.to_string(),
                alert_ids,
                priority,
                opened_at,
                closed_at: Some(closes_at),
                status: CaseStatus::Closed,
                disposition: Some(disposition),
                sar_filed: disposition == Disposition::FiledSar,
            },
            _ => Case {
                case_id,
                customer_id: customer_id.to_string(),
                alert_ids,
                priority,
                opened_at,
                closed_at: None,
                status: CaseStatus::Open,
                disposition: None,
                sar_filed: false,
            },
        }
    }
}

fn draw_disposition(rng: &mut SubsystemRng, weights: &DispositionWeights) -> Option<Disposition> {
    let table: Vec<(Disposition, f64)> = weights.iter().map(|(d, w)| (*d, *w)).collect();
    rng.pick_weighted(&table).copied()
}
