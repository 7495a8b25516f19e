//! Typology injection: adversarial pattern instances written into the
//! ledger and recorded in the scenario registry.
//!
//! EXECUTION ORDER (per run):
//!   1. Injection plans run in configuration order.
//!   2. Within a plan, participants are ranked by a keyed hash and the first
//!      `requested` eligible accounts are taken.
//!   3. Instances are generated in parallel, each from its own keyed stream.
//!   4. Scenarios are appended to the registry in participant order.
//!
//! An account is the primary participant of at most one scenario.

use crate::{
    clock::{add_days, at, SimCalendar},
    config::{GeneratorConfig, InjectionPlan, SelectionPolicy},
    error::SimResult,
    population_subsystem::{Account, Counterparty, Population},
    registry::{Scenario, ScenarioRegistry},
    report::Shortfall,
    rng::{RngBank, StageSlot, SubsystemRng},
    transaction::{LedgerEntry, Transaction, TxnTruth, CASH_COUNTERPARTY},
    types::{floor_cents, round_cents, Channel, Day, Direction, RiskTier, Timestamp, TxnKind, Typology},
};
use chrono::Duration;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Everything the injector adds to a run.
#[derive(Debug, Default)]
pub struct InjectionOutcome {
    pub entries: Vec<LedgerEntry>,
    pub shortfalls: Vec<Shortfall>,
}

struct PatternInstance {
    scenario: Scenario,
    entries: Vec<LedgerEntry>,
}

/// The other side of an injected leg.
struct Party {
    id: String,
    account_ref: Option<String>,
    country: String,
}

impl Party {
    fn cash(home: &str) -> Self {
        Self {
            id: CASH_COUNTERPARTY.to_string(),
            account_ref: None,
            country: home.to_string(),
        }
    }

    fn external(cp: &Counterparty) -> Self {
        Self {
            id: cp.counterparty_id.clone(),
            account_ref: Some(cp.account_ref.clone()),
            country: cp.country.clone(),
        }
    }

    fn internal(account: &Account) -> Self {
        Self {
            id: account.account_id.clone(),
            account_ref: Some(account.account_id.clone()),
            country: account.country.clone(),
        }
    }
}

/// Collects the legs of one instance and turns them into a scenario.
struct PatternBuilder {
    typology: Typology,
    scenario_id: String,
    primary: Account,
    currency: String,
    participants: Vec<String>,
    legs: Vec<Transaction>,
    total_amount: f64,
}

impl PatternBuilder {
    fn new(typology: Typology, primary: &Account, rng: &mut SubsystemRng) -> Self {
        Self {
            typology,
            scenario_id: format!("SCN_{}", rng.uuid().simple()),
            primary: primary.clone(),
            currency: primary.currency.clone(),
            participants: vec![primary.account_id.clone()],
            legs: Vec::new(),
            total_amount: 0.0,
        }
    }

    /// Add a leg booked on `account`. Mirror legs of an internal hop pass
    /// `counted = false` so the scenario total counts each movement once.
    #[allow(clippy::too_many_arguments)]
    fn leg(
        &mut self,
        rng: &mut SubsystemRng,
        account: &Account,
        timestamp: Timestamp,
        amount: f64,
        direction: Direction,
        kind: TxnKind,
        channel: Channel,
        party: &Party,
        description: &str,
        counted: bool,
    ) {
        if !self.participants.contains(&account.account_id) {
            self.participants.push(account.account_id.clone());
        }
        let home = account.country.clone();
        let (origin_country, destination_country) = match direction {
            Direction::Credit => (party.country.clone(), home),
            Direction::Debit => (home, party.country.clone()),
        };
        if counted {
            self.total_amount += amount;
        }
        self.legs.push(Transaction {
            txn_id: format!("TXN_{}", rng.uuid().simple()),
            account_id: account.account_id.clone(),
            customer_id: account.customer_id.clone(),
            timestamp,
            amount,
            currency: self.currency.clone(),
            direction,
            kind,
            channel,
            counterparty_id: party.id.clone(),
            counterparty_account: party.account_ref.clone(),
            origin_country,
            destination_country,
            description: description.to_string(),
        });
    }

    fn finish(self) -> Option<PatternInstance> {
        let start = self.legs.iter().map(|t| t.timestamp).min()?;
        let end = self.legs.iter().map(|t| t.timestamp).max()?;
        let entries: Vec<LedgerEntry> = self
            .legs
            .into_iter()
            .map(|txn| {
                let truth = TxnTruth::injected(&txn.txn_id, self.typology, &self.scenario_id);
                LedgerEntry { txn, truth }
            })
            .collect();
        let scenario = Scenario {
            scenario_id: self.scenario_id,
            typology: self.typology,
            primary_account: self.primary.account_id,
            customer_id: self.primary.customer_id,
            participants: self.participants,
            transaction_ids: entries.iter().map(|e| e.txn.txn_id.clone()).collect(),
            start,
            end,
            total_amount: round_cents(self.total_amount),
        };
        Some(PatternInstance { scenario, entries })
    }
}

pub struct TypologySubsystem<'a> {
    config: &'a GeneratorConfig,
    rng_bank: RngBank,
    calendar: SimCalendar,
    population: &'a Population,
    as_of: Day,
    by_country: BTreeMap<&'a str, Vec<usize>>,
}

impl<'a> TypologySubsystem<'a> {
    pub fn new(
        config: &'a GeneratorConfig,
        rng_bank: RngBank,
        calendar: SimCalendar,
        population: &'a Population,
    ) -> Self {
        Self {
            config,
            rng_bank,
            calendar,
            population,
            as_of: config.run.as_of(),
            by_country: population.counterparties_by_country(),
        }
    }

    /// Run every configured injection plan.
    pub fn inject(&self, registry: &mut ScenarioRegistry) -> SimResult<InjectionOutcome> {
        let mut outcome = InjectionOutcome::default();
        for plan in &self.config.injections {
            self.inject_plan(plan, registry, &mut outcome)?;
        }
        log::info!(
            "stage=typology scenarios={} transactions={} shortfalls={}",
            registry.len(),
            outcome.entries.len(),
            outcome.shortfalls.len()
        );
        Ok(outcome)
    }

    /// Number of instances a plan asks for: the whole part of
    /// `prevalence * accounts`, plus one more with probability equal to the
    /// fractional part. Small populations can legitimately draw zero.
    pub fn requested_count(&self, plan: &InjectionPlan) -> usize {
        if plan.prevalence <= 0.0 {
            return 0;
        }
        let expected = plan.prevalence * self.population.accounts.len() as f64;
        let whole = expected.floor();
        let mut rng = self
            .rng_bank
            .stream(StageSlot::Typology, plan.typology.as_str(), "count");
        let extra = usize::from(rng.chance(expected - whole));
        whole as usize + extra
    }

    pub fn inject_plan(
        &self,
        plan: &InjectionPlan,
        registry: &mut ScenarioRegistry,
        outcome: &mut InjectionOutcome,
    ) -> SimResult<()> {
        let requested = self.requested_count(plan);
        if requested == 0 {
            return Ok(());
        }
        let used: BTreeSet<String> = registry
            .primary_accounts()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut ranked: Vec<(u64, &Account)> = self
            .population
            .accounts
            .iter()
            .filter(|a| !used.contains(&a.account_id))
            .filter(|a| self.is_eligible(plan, a))
            .map(|a| {
                let key = self
                    .rng_bank
                    .stream(StageSlot::Typology, &a.account_id, &format!("select:{}", plan.typology))
                    .next_u64();
                (key, a)
            })
            .collect();
        ranked.sort_by(|x, y| x.0.cmp(&y.0).then_with(|| x.1.account_id.cmp(&y.1.account_id)));

        let chosen: Vec<&Account> = ranked.into_iter().take(requested).map(|(_, a)| a).collect();
        if chosen.len() < requested {
            log::warn!(
                "typology {}: requested {} participants, only {} eligible",
                plan.typology,
                requested,
                chosen.len()
            );
            outcome.shortfalls.push(Shortfall::new(
                format!("typology:{}", plan.typology),
                requested,
                chosen.len(),
            ));
        }

        let instances: Vec<Option<PatternInstance>> = chosen
            .par_iter()
            .map(|account| self.build_instance(plan.typology, account))
            .collect();

        let mut built = 0;
        for instance in instances.into_iter().flatten() {
            built += 1;
            outcome.entries.extend(instance.entries);
            registry.register(instance.scenario);
        }
        if built < chosen.len() {
            log::warn!(
                "typology {}: {} of {} instances could not be placed",
                plan.typology,
                chosen.len() - built,
                chosen.len()
            );
            outcome.shortfalls.push(Shortfall::new(
                format!("typology:{}:placement", plan.typology),
                chosen.len(),
                built,
            ));
        }
        Ok(())
    }

    // ── Eligibility ──────────────────────────────────────────────────────────

    fn is_eligible(&self, plan: &InjectionPlan, account: &Account) -> bool {
        let policy_ok = match plan.selection {
            SelectionPolicy::Random => true,
            SelectionPolicy::HighRisk => self.is_high_risk(account),
            SelectionPolicy::NewAccounts => self.is_new(account),
        };
        let typology_ok = plan.typology != Typology::Mule || self.is_new(account);
        policy_ok && typology_ok && self.start_range(plan.typology, account).is_some()
    }

    fn is_new(&self, account: &Account) -> bool {
        account.open_date >= self.calendar.start
    }

    fn is_high_risk(&self, account: &Account) -> bool {
        let regions = &self.config.regions;
        let customer_risky = self
            .population
            .customer(&account.customer_id)
            .map_or(false, |c| c.risk_rating >= RiskTier::Medium || c.is_pep);
        customer_risky || regions.is_high_risk(&account.country) || regions.is_offshore(&account.country)
    }

    /// Longest span, in days, an instance of the typology can occupy.
    fn span_days(&self, typology: Typology) -> u32 {
        let t = &self.config.typologies;
        match typology {
            Typology::Structuring => t.structuring.timeframe_days.max,
            Typology::RapidMovement => t.rapid_movement.velocity_hours.max.div_ceil(24) + 1,
            Typology::FanIn => t.fan_in.timeframe_days.max,
            Typology::FanOut => t.fan_out.timeframe_days.max,
            Typology::Cycle => t.cycle.timeframe_days.max,
            Typology::Mule => t.mule.window_days,
            Typology::HighRiskCorridor => t.high_risk_corridor.window_days,
            Typology::CashIntensive => t.cash_intensive.window_days,
        }
        .max(1)
    }

    /// Inclusive range of start days that keep the whole instance inside the
    /// account's lifecycle and on or before the as-of date.
    fn start_range(&self, typology: Typology, account: &Account) -> Option<(Day, Day)> {
        let (first, last) = account.active_span(self.calendar.start, self.as_of)?;
        let span = self.span_days(typology) as i64;
        let mut lo = first;
        let mut hi = add_days(last, -(span - 1));
        if typology == Typology::Mule {
            let age = &self.config.typologies.mule.account_age_days;
            lo = lo.max(add_days(account.open_date, age.min as i64));
            hi = hi.min(add_days(account.open_date, age.max as i64));
        }
        (lo <= hi).then_some((lo, hi))
    }

    /// Start day inside `[lo, hi]`, preferring the final detection window.
    fn place(&self, rng: &mut SubsystemRng, (lo, hi): (Day, Day)) -> Day {
        let window = self.config.signals.short_window_days.max(1) as i64;
        let recent_lo = add_days(self.as_of, -(window - 1)).max(lo);
        let from = if rng.chance(self.config.typologies.placement.recent_share) && recent_lo <= hi {
            recent_lo
        } else {
            lo
        };
        let spread = (hi - from).num_days().max(0) as u64;
        add_days(from, rng.range_inclusive(0, spread) as i64)
    }

    // ── Pattern generators ───────────────────────────────────────────────────

    fn build_instance(&self, typology: Typology, account: &Account) -> Option<PatternInstance> {
        let mut rng = self.rng_bank.stream(
            StageSlot::Typology,
            &account.account_id,
            &format!("instance:{typology}"),
        );
        let range = self.start_range(typology, account)?;
        let start = self.place(&mut rng, range);
        let mut builder = PatternBuilder::new(typology, account, &mut rng);
        match typology {
            Typology::Structuring => self.structuring(&mut builder, &mut rng, start),
            Typology::RapidMovement => self.rapid_movement(&mut builder, &mut rng, start),
            Typology::FanIn => self.fan(&mut builder, &mut rng, start, Direction::Credit),
            Typology::FanOut => self.fan(&mut builder, &mut rng, start, Direction::Debit),
            Typology::Cycle => self.cycle(&mut builder, &mut rng, start)?,
            Typology::Mule => self.mule(&mut builder, &mut rng, start),
            Typology::HighRiskCorridor => self.corridor(&mut builder, &mut rng, start),
            Typology::CashIntensive => self.cash_intensive(&mut builder, &mut rng, start),
        }
        log::debug!(
            "typology {typology}: {} legs on {} from {start}",
            builder.legs.len(),
            account.account_id
        );
        builder.finish()
    }

    /// N cash deposits just under the reporting threshold, in business hours.
    fn structuring(&self, b: &mut PatternBuilder, rng: &mut SubsystemRng, start: Day) {
        let p = &self.config.typologies.structuring;
        let primary = b.primary.clone();
        let threshold = self.config.reporting_threshold(&primary.currency);
        let n = rng.range_inclusive(p.transactions.min as u64, p.transactions.max as u64);
        let days = rng.range_inclusive(p.timeframe_days.min as u64, p.timeframe_days.max as u64);
        let cash = Party::cash(&primary.country);
        for _ in 0..n {
            let day = add_days(start, rng.next_u64_below(days) as i64);
            let hour = rng.range_inclusive(p.business_hours.min as u64, p.business_hours.max as u64);
            let minute = rng.range_inclusive(0, 59);
            let amount = floor_cents(rng.uniform(threshold - p.margin, threshold - p.small_offset));
            let channel = if rng.chance(p.branch_share) {
                Channel::Branch
            } else {
                Channel::Atm
            };
            b.leg(
                rng,
                &primary,
                at(day, hour as u32, minute as u32),
                amount,
                Direction::Credit,
                TxnKind::CashDeposit,
                channel,
                &cash,
                "cash",
                true,
            );
        }
    }

    /// One inbound wire, then outbound legs within the velocity window that
    /// together retain a configured fraction of it. Outbound never exceeds
    /// inbound: each leg is truncated to cents.
    fn rapid_movement(&self, b: &mut PatternBuilder, rng: &mut SubsystemRng, start: Day) {
        let p = &self.config.typologies.rapid_movement;
        let primary = b.primary.clone();
        let inbound = round_cents(rng.uniform(p.inbound_amount.min, p.inbound_amount.max));
        let retention = rng.uniform(p.retention.min, p.retention.max);
        let outbound_total = floor_cents(inbound * retention);
        let hops = rng.range_inclusive(p.hops.min as u64, p.hops.max as u64) as usize;

        let source = self.counterparty_for(rng, &primary.country, p.cross_border_share);
        let t_in = at(start, rng.range_inclusive(8, 12) as u32, rng.range_inclusive(0, 59) as u32);
        if let Some(cp) = source {
            b.leg(rng, &primary, t_in, inbound, Direction::Credit, TxnKind::Wire, Channel::Swift, &Party::external(cp), "wire", true);
        }

        let weights: Vec<f64> = (0..hops).map(|_| rng.uniform(0.8, 1.2)).collect();
        let weight_sum: f64 = weights.iter().sum();
        let amounts = split_amount(outbound_total, &weights, weight_sum);
        let mut offsets: Vec<i64> = (0..hops)
            .map(|_| {
                rng.range_inclusive(p.velocity_hours.min as u64 * 60, p.velocity_hours.max as u64 * 60) as i64
            })
            .collect();
        offsets.sort_unstable();

        for (amount, minutes) in amounts.into_iter().zip(offsets) {
            let Some(cp) = self.counterparty_for(rng, &primary.country, p.cross_border_share) else {
                continue;
            };
            let kind = if cp.country == primary.country { TxnKind::Ach } else { TxnKind::Wire };
            b.leg(
                rng,
                &primary,
                t_in + Duration::minutes(minutes),
                amount,
                Direction::Debit,
                kind,
                Channel::Online,
                &Party::external(cp),
                "wire",
                true,
            );
        }
    }

    /// Many distinct counterparties, similar amounts, short timeframe.
    fn fan(&self, b: &mut PatternBuilder, rng: &mut SubsystemRng, start: Day, direction: Direction) {
        let p = match direction {
            Direction::Credit => &self.config.typologies.fan_in,
            Direction::Debit => &self.config.typologies.fan_out,
        };
        let primary = b.primary.clone();
        let pool = &self.population.counterparties;
        let n = rng.range_inclusive(p.counterparties.min as u64, p.counterparties.max as u64) as usize;
        let days = rng.range_inclusive(p.timeframe_days.min as u64, p.timeframe_days.max as u64);
        let base = rng.uniform(p.base_amount.min, p.base_amount.max);

        for i in rng.sample_indices(pool.len(), n) {
            let cp = &pool[i];
            let day = add_days(start, rng.next_u64_below(days) as i64);
            let ts = at(day, rng.range_inclusive(8, 18) as u32, rng.range_inclusive(0, 59) as u32);
            let amount = round_cents(base * (1.0 + rng.uniform(-p.amount_variance, p.amount_variance)));
            let foreign = cp.country != primary.country;
            let (kind, description) = match (direction, foreign) {
                (Direction::Credit, true) => (TxnKind::Wire, "remittance_in"),
                (Direction::Credit, false) => (TxnKind::Ach, "customer"),
                (Direction::Debit, true) => (TxnKind::Wire, "remittance_out"),
                (Direction::Debit, false) => (TxnKind::Ach, "supplier"),
            };
            b.leg(rng, &primary, ts, amount, direction, kind, Channel::Online, &Party::external(cp), description, true);
        }
    }

    /// Funds travel around a closed loop of accounts at this bank, each hop
    /// a little smaller than the last. Both sides of every hop are booked.
    fn cycle(&self, b: &mut PatternBuilder, rng: &mut SubsystemRng, start: Day) -> Option<()> {
        let p = &self.config.typologies.cycle;
        let primary = b.primary.clone();
        let days = rng.range_inclusive(p.timeframe_days.min as u64, p.timeframe_days.max as u64) as i64;
        let last_day = add_days(start, days - 1);
        let wanted = rng.range_inclusive(p.length.min as u64, p.length.max as u64) as usize;

        let partners: Vec<&Account> = self
            .population
            .accounts
            .iter()
            .filter(|a| a.account_id != primary.account_id && a.customer_id != primary.customer_id)
            .filter(|a| a.is_active_on(start) && a.is_active_on(last_day))
            .collect();
        if partners.is_empty() {
            return None;
        }
        let mut members: Vec<&Account> = vec![&primary];
        members.extend(rng.sample_indices(partners.len(), wanted - 1).into_iter().map(|i| partners[i]));
        let length = members.len();
        if length < 2 {
            return None;
        }

        let window_minutes = days * 24 * 60 - 1;
        let spacing = (window_minutes / length as i64).max(1);
        let origin = at(start, 0, 0);
        let mut amount = round_cents(rng.uniform(p.amount.min, p.amount.max));
        for hop in 0..length {
            if hop > 0 {
                amount = round_cents(amount * rng.uniform(p.decay.min, p.decay.max));
            }
            let sender = members[hop];
            let receiver = members[(hop + 1) % length];
            let jitter = rng.next_u64_below(spacing as u64) as i64;
            let ts = origin + Duration::minutes(hop as i64 * spacing + jitter);
            b.leg(rng, sender, ts, amount, Direction::Debit, TxnKind::InternalTransfer, Channel::Online, &Party::internal(receiver), "transfer", true);
            b.leg(rng, receiver, ts, amount, Direction::Credit, TxnKind::InternalTransfer, Channel::Online, &Party::internal(sender), "transfer", false);
        }
        Some(())
    }

    /// A young account suddenly moves many times its declared turnover
    /// through many new counterparties and cash withdrawals.
    fn mule(&self, b: &mut PatternBuilder, rng: &mut SubsystemRng, start: Day) {
        let p = &self.config.typologies.mule;
        let primary = b.primary.clone();
        let pool = &self.population.counterparties;
        let window = p.window_days as u64;

        let spike = rng.uniform(p.spike_multiplier.min, p.spike_multiplier.max);
        let inbound_total = primary.declared_monthly_turnover * spike * window as f64 / 30.0;
        let n = rng.range_inclusive(p.counterparties.min as u64, p.counterparties.max as u64) as usize;
        let picked = rng.sample_indices(pool.len(), n);
        if picked.is_empty() {
            return;
        }
        let n_in = picked.len().div_ceil(2);
        let (inbound_cps, outbound_cps) = picked.split_at(n_in);

        let mut received = 0.0;
        for &i in inbound_cps {
            let amount = round_cents(inbound_total / n_in as f64 * rng.uniform(0.7, 1.3));
            received += amount;
            let day = add_days(start, rng.next_u64_below(window - 2) as i64);
            let ts = at(day, rng.range_inclusive(8, 18) as u32, rng.range_inclusive(0, 59) as u32);
            b.leg(rng, &primary, ts, amount, Direction::Credit, TxnKind::Wire, Channel::Online, &Party::external(&pool[i]), "transfer", true);
        }

        let out_total = floor_cents(received * rng.uniform(p.pass_through.min, p.pass_through.max));
        let n_cash = rng.range_inclusive(p.cash_withdrawals.min as u64, p.cash_withdrawals.max as u64);
        let mut withdrawals: Vec<f64> = (0..n_cash)
            .map(|_| rng.uniform(p.withdrawal_amount.min, p.withdrawal_amount.max))
            .collect();
        let cash_cap = if outbound_cps.is_empty() { out_total } else { out_total * 0.5 };
        let cash_sum: f64 = withdrawals.iter().sum();
        if cash_sum > cash_cap && cash_sum > 0.0 {
            let scale = cash_cap / cash_sum;
            withdrawals.iter_mut().for_each(|w| *w *= scale);
        }
        let withdrawals: Vec<f64> = withdrawals.into_iter().map(floor_cents).collect();
        let cash = Party::cash(&primary.country);
        for amount in &withdrawals {
            let day = add_days(start, 1 + rng.next_u64_below(window - 1) as i64);
            let ts = at(day, rng.range_inclusive(8, 18) as u32, rng.range_inclusive(0, 59) as u32);
            b.leg(rng, &primary, ts, *amount, Direction::Debit, TxnKind::CashWithdrawal, Channel::Atm, &cash, "cash", true);
        }

        if outbound_cps.is_empty() {
            return;
        }
        let remaining = floor_cents(out_total - withdrawals.iter().sum::<f64>()).max(0.0);
        let weights: Vec<f64> = outbound_cps.iter().map(|_| rng.uniform(0.8, 1.2)).collect();
        let weight_sum: f64 = weights.iter().sum();
        for (&i, amount) in outbound_cps.iter().zip(split_amount(remaining, &weights, weight_sum)) {
            let day = add_days(start, 1 + rng.next_u64_below(window - 1) as i64);
            let ts = at(day, rng.range_inclusive(8, 18) as u32, rng.range_inclusive(0, 59) as u32);
            b.leg(rng, &primary, ts, amount, Direction::Debit, TxnKind::Wire, Channel::Online, &Party::external(&pool[i]), "wire", true);
        }
    }

    /// Large outbound wires into configured high-risk jurisdictions.
    fn corridor(&self, b: &mut PatternBuilder, rng: &mut SubsystemRng, start: Day) {
        let p = &self.config.typologies.high_risk_corridor;
        let primary = b.primary.clone();
        let pool = &self.population.counterparties;
        let local: Vec<usize> = p
            .jurisdictions
            .iter()
            .filter_map(|j| self.by_country.get(j.as_str()))
            .flat_map(|idx| idx.iter().copied())
            .collect();
        let n = rng.range_inclusive(p.transactions.min as u64, p.transactions.max as u64);
        for _ in 0..n {
            let cp_index = match rng.pick(&local) {
                Some(i) => Some(*i),
                None => (!pool.is_empty()).then(|| rng.index(pool.len())),
            };
            let Some(cp) = cp_index.and_then(|i| pool.get(i)) else {
                return;
            };
            let mut party = Party::external(cp);
            if !p.jurisdictions.contains(&party.country) {
                if let Some(j) = rng.pick(&p.jurisdictions) {
                    party.country = j.clone();
                }
            }
            let day = add_days(start, rng.next_u64_below(p.window_days as u64) as i64);
            let ts = at(day, rng.range_inclusive(8, 18) as u32, rng.range_inclusive(0, 59) as u32);
            let amount = round_cents(rng.uniform(p.amount.min, p.amount.max));
            b.leg(rng, &primary, ts, amount, Direction::Debit, TxnKind::Wire, Channel::Swift, &party, "wire", true);
        }
    }

    /// A burst of cash deposits, some just under the threshold and many of
    /// the rest in round hundreds.
    fn cash_intensive(&self, b: &mut PatternBuilder, rng: &mut SubsystemRng, start: Day) {
        let p = &self.config.typologies.cash_intensive;
        let primary = b.primary.clone();
        let threshold = self.config.reporting_threshold(&primary.currency);
        let cash = Party::cash(&primary.country);
        let n = rng.range_inclusive(p.deposits.min as u64, p.deposits.max as u64);
        for _ in 0..n {
            let amount = if rng.chance(p.near_threshold_share) {
                floor_cents(threshold - rng.uniform(p.near_threshold_gap.min, p.near_threshold_gap.max))
            } else {
                let small = rng.uniform(p.small_amount.min, p.small_amount.max);
                if rng.chance(p.round_share) {
                    ((small / 100.0).round() * 100.0).max(100.0)
                } else {
                    round_cents(small)
                }
            };
            let day = add_days(start, rng.next_u64_below(p.window_days as u64) as i64);
            let ts = at(day, rng.range_inclusive(9, 16) as u32, rng.range_inclusive(0, 59) as u32);
            b.leg(rng, &primary, ts, amount, Direction::Credit, TxnKind::CashDeposit, Channel::Branch, &cash, "cash", true);
        }
    }

    /// A pool counterparty abroad with probability `cross_border_share`,
    /// otherwise one in `home`. Falls back to any counterparty.
    fn counterparty_for(&self, rng: &mut SubsystemRng, home: &str, cross_border_share: f64) -> Option<&'a Counterparty> {
        let pool: &'a [Counterparty] = &self.population.counterparties;
        let want_foreign = rng.chance(cross_border_share);
        let candidates: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, cp)| (cp.country != home) == want_foreign)
            .map(|(i, _)| i)
            .collect();
        let index = match rng.pick(&candidates) {
            Some(i) => *i,
            None if pool.is_empty() => return None,
            None => rng.index(pool.len()),
        };
        pool.get(index)
    }
}

/// Split `total` by weight, truncating every part to cents so the parts
/// never sum to more than `total`.
fn split_amount(total: f64, weights: &[f64], weight_sum: f64) -> Vec<f64> {
    if weights.is_empty() || weight_sum <= 0.0 {
        return Vec::new();
    }
    let mut parts = Vec::with_capacity(weights.len());
    let mut assigned = 0.0;
    for (i, w) in weights.iter().enumerate() {
        let part = if i + 1 == weights.len() {
            floor_cents((total - assigned).max(0.0))
        } else {
            floor_cents(total * w / weight_sum)
        };
        assigned += part;
        parts.push(part);
    }
    parts
}
