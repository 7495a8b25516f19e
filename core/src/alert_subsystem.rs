//! Alert rules engine.
//!
//! Three passes, in this order:
//!   1. Evaluation: every compiled rule against every signal record. Each
//!      rule that matches produces its own alert, tiered by its highest
//!      satisfied escalation. Runs per record in parallel.
//!   2. Calibration: one sequential pass over the whole alert population
//!      that moves the tier mix toward the configured targets.
//!   3. Tagging: true-positive status from the scenario registry.
//!
//! RULE: Tagging runs last. Nothing in passes 1 and 2 may read the registry.

use crate::{
    config::GeneratorConfig,
    registry::{Scenario, ScenarioRegistry},
    report::Shortfall,
    rng::{RngBank, StageSlot},
    rules::{AlertRule, RuleSet},
    signal::{SignalName, SignalRecord, SignalValue},
    types::{round_cents, Day, EntityId, RiskTier, Typology},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Alerts list at most this many driving transactions.
pub const MAX_ALERT_TRANSACTIONS: usize = 50;

const SCORE_NOISE: f64 = 5.0;

/// Visible alert, as an investigator would see it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub alert_id: EntityId,
    pub rule_id: String,
    pub rule_name: String,
    pub alert_type: String,
    pub account_id: EntityId,
    pub customer_id: EntityId,
    pub created_on: Day,
    /// Calibrated tier.
    #[serde(rename = "risk_level")]
    pub risk_tier: RiskTier,
    /// Tier the rule itself assigned, before calibration.
    pub rule_tier: RiskTier,
    pub score: f64,
    pub risk_factors: Vec<String>,
    pub triggering_signals: BTreeMap<SignalName, SignalValue>,
    pub transaction_ids: Vec<EntityId>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<EntityId>,
}

/// Hidden labels for one alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertTruth {
    pub alert_id: EntityId,
    pub true_positive: bool,
    pub scenario_id: Option<EntityId>,
    pub typology: Option<Typology>,
    pub calibration_filler: bool,
}

/// What the calibration pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationSummary {
    /// Natural lows promoted to medium.
    pub promoted: usize,
    /// Synthesized low alerts, by id.
    pub fillers: BTreeSet<EntityId>,
    /// Weakest natural non-low alerts moved to low once the filler pool ran dry.
    pub demoted: usize,
    /// Non-low alerts whose tier the quota pass changed.
    pub retiered: usize,
    pub shortfall: Option<Shortfall>,
}

#[derive(Debug, Clone)]
pub struct AlertBatch {
    pub alerts: Vec<Alert>,
    pub truth: Vec<AlertTruth>,
    pub calibration: CalibrationSummary,
}

pub struct AlertSubsystem<'a> {
    config: &'a GeneratorConfig,
    rules: &'a RuleSet,
    rng_bank: RngBank,
}

impl<'a> AlertSubsystem<'a> {
    pub fn new(config: &'a GeneratorConfig, rules: &'a RuleSet, rng_bank: RngBank) -> Self {
        Self {
            config,
            rules,
            rng_bank,
        }
    }

    /// Evaluate, calibrate, then tag.
    pub fn run(&self, signals: &[SignalRecord], registry: &ScenarioRegistry) -> AlertBatch {
        let mut alerts = self.evaluate(signals);
        let natural = alerts.len();
        let calibration = if self.config.calibration.enabled {
            self.calibrate(&mut alerts, signals)
        } else {
            CalibrationSummary::default()
        };
        alerts.sort_by(|a, b| {
            a.account_id
                .cmp(&b.account_id)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
                .then_with(|| a.alert_id.cmp(&b.alert_id))
        });
        let truth = tag_ground_truth(&alerts, &calibration.fillers, registry);
        log::info!(
            "stage=alert natural={natural} total={} promoted={} fillers={} demoted={} retiered={}",
            alerts.len(),
            calibration.promoted,
            calibration.fillers.len(),
            calibration.demoted,
            calibration.retiered
        );
        AlertBatch {
            alerts,
            truth,
            calibration,
        }
    }

    /// Natural alerts, in record then rule order.
    pub fn evaluate(&self, signals: &[SignalRecord]) -> Vec<Alert> {
        signals
            .par_iter()
            .flat_map_iter(|record| {
                self.rules
                    .rules()
                    .iter()
                    .filter(|rule| rule.matches(record))
                    .map(move |rule| self.raise(rule, record))
            })
            .collect()
    }

    fn raise(&self, rule: &AlertRule, record: &SignalRecord) -> Alert {
        let mut rng = self
            .rng_bank
            .stream(StageSlot::Alert, &record.account_id, &rule.rule_id);
        let tier = rule.tier_for(record);
        let noise = rng.uniform(-SCORE_NOISE, SCORE_NOISE);
        let score = clamp_score(tier.base_score() + rule.strength(record) + noise);
        let alert_id = format!("ALERT_{}", rng.uuid().simple());
        build_alert(alert_id, rule, record, tier, score)
    }

    /// Move the tier mix toward the configured targets. Lows are fixed first,
    /// by promotion or by filling from quiet accounts (demoting the weakest
    /// non-low alerts when too few quiet accounts remain), then the non-low
    /// tiers are re-ranked into their quotas.
    pub fn calibrate(&self, alerts: &mut Vec<Alert>, signals: &[SignalRecord]) -> CalibrationSummary {
        let mut summary = CalibrationSummary::default();
        if alerts.is_empty() {
            return summary;
        }
        let targets = self.config.calibration.targets;
        let total = alerts.len();
        let lows = count_tier(alerts, RiskTier::Low);
        let wanted_low = (total as f64 * targets.low).round() as usize;

        if lows > wanted_low {
            summary.promoted = promote_lows(alerts, lows - wanted_low);
        } else {
            let non_low = total - lows;
            let required_low = required_lows(non_low, targets.low);
            if required_low > lows {
                let need = required_low - lows;
                let fillers = self.fill_lows(alerts, signals, need);
                if fillers.len() < need {
                    let shortfall = Shortfall::new("calibration:low_fill", need, fillers.len());
                    log::warn!("stage=alert shortfall {shortfall}");
                    summary.shortfall = Some(shortfall);
                    let total = alerts.len();
                    let wanted_low = (total as f64 * targets.low).round() as usize;
                    let lows = count_tier(alerts, RiskTier::Low);
                    summary.demoted = demote_weakest(alerts, wanted_low.saturating_sub(lows));
                }
                summary.fillers = fillers;
            }
        }
        summary.retiered = self.rebalance_non_low(alerts);
        summary
    }

    /// Synthesize up to `need` low alerts on accounts that raised nothing,
    /// closest near misses first.
    fn fill_lows(&self, alerts: &mut Vec<Alert>, signals: &[SignalRecord], need: usize) -> BTreeSet<EntityId> {
        let alerted: BTreeSet<&str> = alerts.iter().map(|a| a.account_id.as_str()).collect();
        let mut candidates: Vec<(f64, &SignalRecord, &AlertRule)> = signals
            .iter()
            .filter(|r| !alerted.contains(r.account_id.as_str()))
            .filter_map(|record| {
                self.closest_rule(record)
                    .map(|(closeness, rule)| (closeness, record, rule))
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.account_id.cmp(&b.1.account_id))
        });

        let score_range = self.config.calibration.filler_score;
        let mut fillers = BTreeSet::new();
        for (_, record, rule) in candidates.into_iter().take(need) {
            let mut rng = self.rng_bank.stream(
                StageSlot::Calibration,
                &record.account_id,
                &format!("filler:{}", rule.rule_id),
            );
            let score = clamp_score(rng.uniform(score_range.min, score_range.max));
            let alert_id = format!("ALERT_{}", rng.uuid().simple());
            fillers.insert(alert_id.clone());
            alerts.push(build_alert(alert_id, rule, record, RiskTier::Low, score));
        }
        fillers
    }

    /// Rule the record comes closest to firing. Ties go to catalog order.
    fn closest_rule(&self, record: &SignalRecord) -> Option<(f64, &'a AlertRule)> {
        let rules: &'a RuleSet = self.rules;
        let mut best: Option<(f64, &'a AlertRule)> = None;
        for rule in rules.rules() {
            let closeness = rule.near_miss(record);
            if best.map_or(true, |(c, _)| closeness > c) {
                best = Some((closeness, rule));
            }
        }
        best
    }

    /// Assign critical, high and medium by quota over the non-low alerts,
    /// ranked by rule tier, then score. Returns the number of tier changes.
    fn rebalance_non_low(&self, alerts: &mut [Alert]) -> usize {
        let targets = self.config.calibration.targets;
        let total = alerts.len() as f64;
        let mut ranked: Vec<usize> = (0..alerts.len())
            .filter(|&i| alerts[i].risk_tier != RiskTier::Low)
            .collect();
        if ranked.is_empty() {
            return 0;
        }
        ranked.sort_by(|&a, &b| {
            let (x, y) = (&alerts[a], &alerts[b]);
            y.rule_tier
                .cmp(&x.rule_tier)
                .then_with(|| y.score.total_cmp(&x.score))
                .then_with(|| x.alert_id.cmp(&y.alert_id))
        });

        let critical = ((total * targets.critical).round() as usize).max(1).min(ranked.len());
        let high = ((total * targets.high).round() as usize).min(ranked.len() - critical);
        let mut changed = 0;
        for (rank, &i) in ranked.iter().enumerate() {
            let tier = if rank < critical {
                RiskTier::Critical
            } else if rank < critical + high {
                RiskTier::High
            } else {
                RiskTier::Medium
            };
            if alerts[i].risk_tier != tier {
                retier(&mut alerts[i], tier);
                changed += 1;
            }
        }
        changed
    }
}

/// Smallest low count that reaches `share` of the total next to `non_low`
/// other alerts.
pub fn required_lows(non_low: usize, share: f64) -> usize {
    if share <= 0.0 || share >= 1.0 {
        return 0;
    }
    (non_low as f64 * share / (1.0 - share) - 1e-9).ceil().max(0.0) as usize
}

fn count_tier(alerts: &[Alert], tier: RiskTier) -> usize {
    alerts.iter().filter(|a| a.risk_tier == tier).count()
}

/// Promote the `excess` highest-scoring lows to medium.
fn promote_lows(alerts: &mut [Alert], excess: usize) -> usize {
    let mut lows: Vec<usize> = (0..alerts.len())
        .filter(|&i| alerts[i].risk_tier == RiskTier::Low)
        .collect();
    lows.sort_by(|&a, &b| {
        alerts[b]
            .score
            .total_cmp(&alerts[a].score)
            .then_with(|| alerts[a].alert_id.cmp(&alerts[b].alert_id))
    });
    let promoted = excess.min(lows.len());
    for &i in &lows[..promoted] {
        retier(&mut alerts[i], RiskTier::Medium);
    }
    promoted
}

/// Demote the `count` weakest non-low alerts, lowest rule tier first, then
/// lowest score. At least one non-low alert always survives.
fn demote_weakest(alerts: &mut [Alert], count: usize) -> usize {
    let mut non_low: Vec<usize> = (0..alerts.len())
        .filter(|&i| alerts[i].risk_tier != RiskTier::Low)
        .collect();
    non_low.sort_by(|&a, &b| {
        let (x, y) = (&alerts[a], &alerts[b]);
        x.rule_tier
            .cmp(&y.rule_tier)
            .then_with(|| x.score.total_cmp(&y.score))
            .then_with(|| x.alert_id.cmp(&y.alert_id))
    });
    let demoted = count.min(non_low.len().saturating_sub(1));
    for &i in &non_low[..demoted] {
        retier(&mut alerts[i], RiskTier::Low);
    }
    demoted
}

/// Change an alert's tier, moving its score by the difference between the
/// two tiers' anchors.
fn retier(alert: &mut Alert, tier: RiskTier) {
    let shift = tier.base_score() - alert.risk_tier.base_score();
    alert.score = clamp_score(alert.score + shift);
    alert.risk_tier = tier;
}

fn clamp_score(score: f64) -> f64 {
    round_cents(score.clamp(0.0, 100.0))
}

fn build_alert(
    alert_id: EntityId,
    rule: &AlertRule,
    record: &SignalRecord,
    tier: RiskTier,
    score: f64,
) -> Alert {
    let signals = rule.signals();
    let triggering_signals: BTreeMap<SignalName, SignalValue> = signals
        .iter()
        .filter_map(|name| record.get(*name).map(|v| (*name, v.clone())))
        .collect();

    let mut risk_factors: Vec<String> = Vec::new();
    let held = rule
        .conditions
        .iter()
        .chain(rule.escalations.iter().map(|e| &e.when))
        .filter(|c| c.holds(record));
    for condition in held {
        let factor = condition.signal().risk_factor().to_string();
        if !risk_factors.contains(&factor) {
            risk_factors.push(factor);
        }
    }

    let mut seen = BTreeSet::new();
    let transaction_ids: Vec<EntityId> = signals
        .iter()
        .flat_map(|name| record.contributing(*name).iter())
        .filter(|id| seen.insert(id.as_str()))
        .take(MAX_ALERT_TRANSACTIONS)
        .cloned()
        .collect();

    let described: Vec<String> = rule.conditions.iter().map(|c| c.describe()).collect();
    Alert {
        alert_id,
        rule_id: rule.rule_id.clone(),
        rule_name: rule.name.clone(),
        alert_type: rule.alert_type.clone(),
        account_id: record.account_id.clone(),
        customer_id: record.customer_id.clone(),
        created_on: record.as_of,
        risk_tier: tier,
        rule_tier: tier,
        score,
        risk_factors,
        triggering_signals,
        transaction_ids,
        description: format!("{} ({})", rule.description, described.join(" and ")),
        case_id: None,
    }
}

/// An alert is a true positive when its account took part in any scenario.
/// The linked scenario prefers one whose typology matches the alert type.
fn tag_ground_truth(
    alerts: &[Alert],
    fillers: &BTreeSet<EntityId>,
    registry: &ScenarioRegistry,
) -> Vec<AlertTruth> {
    let index = registry.participant_index();
    alerts
        .iter()
        .map(|alert| {
            let linked: Option<&Scenario> = index.get(alert.account_id.as_str()).and_then(|found| {
                found
                    .iter()
                    .find(|s| s.typology.as_str() == alert.alert_type)
                    .or_else(|| found.first())
                    .copied()
            });
            AlertTruth {
                alert_id: alert.alert_id.clone(),
                true_positive: linked.is_some(),
                scenario_id: linked.map(|s| s.scenario_id.clone()),
                typology: linked.map(|s| s.typology),
                calibration_filler: fillers.contains(&alert.alert_id),
            }
        })
        .collect()
}
