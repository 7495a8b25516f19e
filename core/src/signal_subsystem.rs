//! Signal generation: behavioural, network and entity features per account.
//!
//! RULE: This stage sees `&Transaction` only. It has no access to
//! `TxnTruth` or the scenario registry, and must never be given either.
//!
//! Every numeric value is perturbed with N(0, |v| * noise_coefficient) from
//! the (signal, account, as-of) stream, so recomputing a record for the same
//! inputs gives the same record.

use crate::{
    clock::add_days,
    config::GeneratorConfig,
    graph::GraphProvider,
    news::NewsProvider,
    population_subsystem::{Account, Customer, Population},
    rng::{RngBank, StageSlot},
    signal::{SignalName, SignalRecord, SignalValue},
    transaction::{Transaction, CASH_COUNTERPARTY},
    types::{Day, Direction, EntityId},
};
use chrono::Duration;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Dormancy reported for an account with no transactions at all.
pub const NO_ACTIVITY_DORMANCY: f64 = 999.0;

/// Country risk above which a cross-border transaction is listed as a
/// corridor contributor.
const CORRIDOR_CONTRIBUTOR_RISK: f64 = 50.0;

pub struct SignalSubsystem<'a> {
    config: &'a GeneratorConfig,
    rng_bank: RngBank,
    population: &'a Population,
    graph: &'a dyn GraphProvider,
    news: &'a dyn NewsProvider,
    history_start: Day,
}

impl<'a> SignalSubsystem<'a> {
    pub fn new(
        config: &'a GeneratorConfig,
        rng_bank: RngBank,
        population: &'a Population,
        graph: &'a dyn GraphProvider,
        news: &'a dyn NewsProvider,
    ) -> Self {
        Self {
            config,
            rng_bank,
            population,
            graph,
            news,
            history_start: config.run.start_date,
        }
    }

    /// One record per account opened on or before `as_of`, in account order.
    pub fn compute_all(
        &self,
        by_account: &BTreeMap<&str, Vec<&Transaction>>,
        as_of: Day,
    ) -> Vec<SignalRecord> {
        let records: Vec<SignalRecord> = self
            .population
            .accounts
            .par_iter()
            .filter(|a| a.open_date <= as_of)
            .filter_map(|account| {
                let customer = self.population.customer(&account.customer_id)?;
                let txns = by_account
                    .get(account.account_id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                Some(self.compute(account, customer, txns, as_of))
            })
            .collect();
        log::info!("stage=signal as_of={as_of} records={}", records.len());
        records
    }

    /// Signals for one account. `txns` must be that account's visible
    /// transactions; anything after `as_of` is ignored.
    pub fn compute(
        &self,
        account: &Account,
        customer: &Customer,
        txns: &[&Transaction],
        as_of: Day,
    ) -> SignalRecord {
        let txns: Vec<&Transaction> = txns
            .iter()
            .copied()
            .filter(|t| t.account_id == account.account_id && t.day() <= as_of)
            .collect();
        let mut out = SignalSet::default();
        self.behavioural(&mut out, account, &txns, as_of);
        self.network(&mut out, account, as_of);
        self.entity(&mut out, account, customer, &txns, as_of);
        self.apply_noise(&mut out.values, &account.account_id, as_of);
        SignalRecord {
            account_id: account.account_id.clone(),
            customer_id: account.customer_id.clone(),
            as_of,
            values: out.values,
            contributing: out.contributing,
        }
    }

    fn window_start(&self, as_of: Day, days: u32) -> Day {
        add_days(as_of, -(days.max(1) as i64 - 1))
    }

    // ── Behavioural ──────────────────────────────────────────────────────────

    fn behavioural(&self, out: &mut SignalSet, account: &Account, txns: &[&Transaction], as_of: Day) {
        let cfg = &self.config.signals;
        let short_start = self.window_start(as_of, cfg.short_window_days);
        let long_start = self.window_start(as_of, cfg.long_window_days);
        let recent: Vec<&Transaction> = txns.iter().copied().filter(|t| t.day() >= short_start).collect();

        let volume_30d: f64 = recent.iter().map(|t| t.amount).sum();
        let volume_90d: f64 = txns
            .iter()
            .filter(|t| t.day() >= long_start)
            .map(|t| t.amount)
            .sum();
        out.numeric(SignalName::Velocity30d, recent.len() as f64);
        out.numeric(SignalName::Volume30d, volume_30d);
        out.numeric(SignalName::Volume90d, volume_90d);
        out.numeric(SignalName::VolumeZscore, self.volume_zscore(account, txns, as_of));

        let credits: f64 = sum_direction(&recent, Direction::Credit);
        let debits: f64 = sum_direction(&recent, Direction::Debit);
        out.numeric(SignalName::InOutRatio, if debits > 0.0 { credits / debits } else { 0.0 });

        let (rapid, rapid_ids) = self.rapid_movement(&recent, txns, credits);
        out.numeric(SignalName::RapidMovementScore, rapid);
        out.contribute(SignalName::RapidMovementScore, rapid_ids);

        let near: Vec<&Transaction> = recent
            .iter()
            .copied()
            .filter(|t| self.is_near_threshold(t))
            .collect();
        out.numeric(SignalName::StructuringScore, near.len() as f64);
        out.contribute(SignalName::StructuringScore, ids(&near));

        out.numeric(SignalName::CounterpartyConcentration, herfindahl(&recent));

        let (new_rate, new_ids) = new_counterparty_rate(txns, short_start);
        out.numeric(SignalName::NewCounterpartyRate, new_rate);
        out.contribute(SignalName::NewCounterpartyRate, new_ids);

        let (corridor, corridor_ids) = self.corridor_risk(&recent, volume_30d);
        out.numeric(SignalName::CorridorRiskScore, corridor);
        out.contribute(SignalName::CorridorRiskScore, corridor_ids);

        let cash: Vec<&Transaction> = recent.iter().copied().filter(|t| t.kind.is_cash()).collect();
        out.numeric(SignalName::CashIntensity, ratio(cash.len(), recent.len()));
        out.contribute(SignalName::CashIntensity, ids(&cash));

        let round: Vec<&Transaction> = recent
            .iter()
            .copied()
            .filter(|t| is_round_amount(t.amount, cfg.round_amount_unit))
            .collect();
        out.numeric(SignalName::RoundAmountRatio, ratio(round.len(), recent.len()));
        out.contribute(SignalName::RoundAmountRatio, ids(&round));
    }

    fn is_near_threshold(&self, txn: &Transaction) -> bool {
        let threshold = self.config.reporting_threshold(&txn.currency);
        let floor = threshold * (1.0 - self.config.signals.near_threshold_band);
        txn.amount >= floor && txn.amount < threshold
    }

    /// Z-score of the latest window's volume against the preceding complete
    /// windows of the same length. Zero without enough history or variance.
    fn volume_zscore(&self, account: &Account, txns: &[&Transaction], as_of: Day) -> f64 {
        let cfg = &self.config.signals;
        let width = cfg.short_window_days.max(1) as i64;
        let first_day = account.open_date.max(self.history_start);
        let span = (as_of - first_day).num_days() + 1;
        let buckets = (span / width) as usize;
        if buckets < cfg.min_history_months as usize + 1 {
            return 0.0;
        }
        let mut volumes = vec![0.0; buckets];
        for txn in txns {
            let back = (as_of - txn.day()).num_days();
            let bucket = (back / width) as usize;
            if back >= 0 && bucket < buckets {
                volumes[bucket] += txn.amount;
            }
        }
        let current = volumes[0];
        let history = &volumes[1..];
        let mean = history.iter().sum::<f64>() / history.len() as f64;
        let variance = history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / history.len() as f64;
        let std = variance.sqrt();
        if std == 0.0 {
            0.0
        } else {
            (current - mean) / std
        }
    }

    /// Share of recent inbound value that left again within the rapid
    /// window. A credit counts when debits following it, each at least
    /// `rapid_min_leg_share` of the credit, add up to within `rapid_match`
    /// of it. A debit is matched to one credit at most.
    fn rapid_movement(
        &self,
        recent: &[&Transaction],
        all: &[&Transaction],
        credit_volume: f64,
    ) -> (f64, Vec<EntityId>) {
        let cfg = &self.config.signals;
        if credit_volume <= 0.0 {
            return (0.0, Vec::new());
        }
        let window = Duration::hours(cfg.rapid_window_hours as i64);
        let debits: Vec<&Transaction> = all
            .iter()
            .copied()
            .filter(|t| t.direction == Direction::Debit)
            .collect();
        let mut consumed = vec![false; debits.len()];
        let mut matched = 0.0;
        let mut contributing = Vec::new();

        for credit in recent.iter().filter(|t| t.direction == Direction::Credit) {
            let lo = credit.amount * cfg.rapid_match.min;
            let hi = credit.amount * cfg.rapid_match.max;
            let min_leg = credit.amount * cfg.rapid_min_leg_share;
            let mut acc = 0.0;
            let mut used = Vec::new();
            for (i, debit) in debits.iter().enumerate() {
                if consumed[i] || debit.timestamp <= credit.timestamp {
                    continue;
                }
                if debit.timestamp > credit.timestamp + window {
                    break;
                }
                if debit.amount < min_leg || acc + debit.amount > hi {
                    continue;
                }
                acc += debit.amount;
                used.push(i);
                if acc >= lo {
                    break;
                }
            }
            if acc >= lo && acc <= hi {
                matched += credit.amount;
                contributing.push(credit.txn_id.clone());
                for i in used {
                    consumed[i] = true;
                    contributing.push(debits[i].txn_id.clone());
                }
            }
        }
        ((matched / credit_volume).min(1.0), contributing)
    }

    /// Amount-weighted risk of the far-side country over cross-border
    /// transactions, relative to the window's whole volume.
    fn corridor_risk(&self, recent: &[&Transaction], volume: f64) -> (f64, Vec<EntityId>) {
        if volume <= 0.0 {
            return (0.0, Vec::new());
        }
        let regions = &self.config.regions;
        let mut weighted = 0.0;
        let mut contributing = Vec::new();
        for txn in recent.iter().filter(|t| t.is_cross_border()) {
            let risk = regions.country_risk(txn.counterparty_country());
            weighted += txn.amount * risk;
            if risk > CORRIDOR_CONTRIBUTOR_RISK {
                contributing.push(txn.txn_id.clone());
            }
        }
        (weighted / volume, contributing)
    }

    // ── Network ──────────────────────────────────────────────────────────────

    fn network(&self, out: &mut SignalSet, account: &Account, as_of: Day) {
        let m = self.graph.metrics(&account.account_id, as_of);
        out.numeric(SignalName::DegreeCentrality, m.degree);
        out.numeric(SignalName::RiskFlowIn, m.risk_flow_in);
        out.numeric(SignalName::RiskFlowOut, m.risk_flow_out);
        out.numeric(SignalName::PepDistance, m.pep_distance as f64);
        out.numeric(SignalName::SanctionsDistance, m.sanctions_distance as f64);
    }

    // ── Entity ───────────────────────────────────────────────────────────────

    fn entity(
        &self,
        out: &mut SignalSet,
        account: &Account,
        customer: &Customer,
        txns: &[&Transaction],
        as_of: Day,
    ) {
        out.flag(SignalName::PepFlag, customer.is_pep);
        out.flag(SignalName::SanctionsFlag, customer.is_sanctioned);

        let media = self.news.adverse_media(&customer.customer_id, as_of);
        out.flag(SignalName::AdverseMediaFlag, media.flagged());
        out.numeric(SignalName::AdverseMediaCount, media.count as f64);
        out.values.insert(
            SignalName::AdverseMediaSeverity,
            SignalValue::Category(media.severity_label().to_string()),
        );

        out.numeric(
            SignalName::JurisdictionRisk,
            self.config.regions.country_risk(&account.country),
        );
        out.numeric(
            SignalName::KycAgeDays,
            (as_of - customer.kyc_date).num_days().max(0) as f64,
        );
        out.numeric(
            SignalName::AccountAgeDays,
            (as_of - account.open_date).num_days().max(0) as f64,
        );
        out.numeric(
            SignalName::DeclaredVsActualVolume,
            self.declared_vs_actual(account, txns, as_of),
        );
        out.numeric(SignalName::DormancyDays, self.dormancy(account, txns, as_of));
    }

    /// Average 30-day volume over the observed history divided by the KYC
    /// declared monthly turnover. 1.0 when either side is missing.
    fn declared_vs_actual(&self, account: &Account, txns: &[&Transaction], as_of: Day) -> f64 {
        if txns.is_empty() || account.declared_monthly_turnover <= 0.0 {
            return 1.0;
        }
        let first_day = account.open_date.max(self.history_start);
        let days = ((as_of - first_day).num_days() + 1).max(1) as f64;
        let months = (days / 30.0).max(1.0);
        let total: f64 = txns.iter().map(|t| t.amount).sum();
        total / months / account.declared_monthly_turnover
    }

    /// Length of the quiet spell that preceded the current window's
    /// activity. Without recent activity it is the time since the last
    /// transaction.
    fn dormancy(&self, account: &Account, txns: &[&Transaction], as_of: Day) -> f64 {
        let Some(last) = txns.last() else {
            return NO_ACTIVITY_DORMANCY;
        };
        let short_start = self.window_start(as_of, self.config.signals.short_window_days);
        let first_recent = txns.iter().find(|t| t.day() >= short_start);
        match first_recent {
            None => (as_of - last.day()).num_days() as f64,
            Some(first) => {
                let before = txns.iter().rev().find(|t| t.day() < short_start);
                let quiet_since = match before {
                    Some(prev) => prev.day(),
                    None => account.open_date.max(self.history_start),
                };
                (first.day() - quiet_since).num_days().max(0) as f64
            }
        }
    }

    // ── Noise ────────────────────────────────────────────────────────────────

    fn apply_noise(&self, values: &mut BTreeMap<SignalName, SignalValue>, account_id: &str, as_of: Day) {
        let coefficient = self.config.signals.noise_coefficient;
        if coefficient <= 0.0 {
            return;
        }
        let mut rng = self
            .rng_bank
            .stream(StageSlot::Signal, account_id, &as_of.to_string());
        for value in values.values_mut() {
            if let SignalValue::Numeric(v) = value {
                if *v != 0.0 {
                    let noisy = *v + rng.gaussian(0.0, v.abs() * coefficient);
                    *v = (noisy * 10_000.0).round() / 10_000.0;
                }
            }
        }
    }
}

/// Values and contributors collected for one record.
#[derive(Default)]
struct SignalSet {
    values: BTreeMap<SignalName, SignalValue>,
    contributing: BTreeMap<SignalName, Vec<EntityId>>,
}

impl SignalSet {
    fn numeric(&mut self, name: SignalName, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        self.values.insert(name, SignalValue::Numeric(value));
    }

    fn flag(&mut self, name: SignalName, value: bool) {
        self.values.insert(name, SignalValue::Flag(value));
    }

    fn contribute(&mut self, name: SignalName, ids: Vec<EntityId>) {
        if !ids.is_empty() {
            self.contributing.insert(name, ids);
        }
    }
}

fn ids(txns: &[&Transaction]) -> Vec<EntityId> {
    txns.iter().map(|t| t.txn_id.clone()).collect()
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn sum_direction(txns: &[&Transaction], direction: Direction) -> f64 {
    txns.iter()
        .filter(|t| t.direction == direction)
        .map(|t| t.amount)
        .sum()
}

/// Herfindahl index of value share per counterparty. Cash counts as one
/// counterparty.
fn herfindahl(txns: &[&Transaction]) -> f64 {
    let total: f64 = txns.iter().map(|t| t.amount).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let mut by_party: BTreeMap<&str, f64> = BTreeMap::new();
    for txn in txns {
        *by_party.entry(txn.counterparty_id.as_str()).or_insert(0.0) += txn.amount;
    }
    by_party.values().map(|v| (v / total).powi(2)).sum()
}

/// Share of all counterparties ever seen that first appeared inside the
/// current window, and the transactions that introduced them.
fn new_counterparty_rate(txns: &[&Transaction], window_start: Day) -> (f64, Vec<EntityId>) {
    let mut first_seen: HashMap<&str, &Transaction> = HashMap::new();
    for txn in txns {
        if txn.counterparty_id == CASH_COUNTERPARTY {
            continue;
        }
        first_seen.entry(txn.counterparty_id.as_str()).or_insert(txn);
    }
    if first_seen.is_empty() {
        return (0.0, Vec::new());
    }
    let mut introducing: Vec<&Transaction> = first_seen
        .values()
        .copied()
        .filter(|t| t.day() >= window_start)
        .collect();
    introducing.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.txn_id.cmp(&b.txn_id)));
    (ratio(introducing.len(), first_seen.len()), ids(&introducing))
}

/// Multiples of 10 units or 5 units are round; multiples of one unit are
/// round from 10 units upwards.
fn is_round_amount(amount: f64, unit: f64) -> bool {
    let cents = (amount * 100.0).round() as i64;
    let unit_cents = (unit * 100.0).round() as i64;
    if cents <= 0 || unit_cents <= 0 {
        return false;
    }
    cents % (unit_cents * 10) == 0
        || cents % (unit_cents * 5) == 0
        || (cents % unit_cents == 0 && cents >= unit_cents * 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_amounts() {
        assert!(is_round_amount(1_000.0, 100.0));
        assert!(is_round_amount(500.0, 100.0));
        assert!(is_round_amount(2_300.0, 100.0));
        assert!(!is_round_amount(300.0, 100.0));
        assert!(!is_round_amount(9_612.40, 100.0));
    }
}
