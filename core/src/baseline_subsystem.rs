//! Baseline ("normal") transaction generation.
//!
//! Each account is simulated independently, one day at a time, from its own
//! keyed streams: (baseline, account, "profile") for the standing profile and
//! (baseline, account, day) for the day's draws. Accounts are processed in
//! parallel; the output does not depend on scheduling.

use crate::{
    clock::{at, SimCalendar},
    config::{ActivityConfig, ActivityDirection, GeneratorConfig, SegmentConfig},
    error::{SimError, SimResult},
    population_subsystem::{Account, Population},
    rng::{RngBank, StageSlot, SubsystemRng},
    transaction::{Transaction, CASH_COUNTERPARTY},
    types::{round_cents, Channel, Day, Direction, TxnKind},
};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Transactions only book between 08:00 and 18:59.
pub const BUSINESS_HOURS: (u64, u64) = (8, 18);

/// Share of counterparty picks that go outside the account's usual set.
const NEW_COUNTERPARTY_SHARE: f64 = 0.08;

/// Amount dispersion around an account's typical transaction size.
const AMOUNT_SIGMA: f64 = 0.5;

/// Standing behaviour of one account, drawn once.
struct AccountProfile {
    typical_size: f64,
    domestic: Vec<usize>,
    foreign: Vec<usize>,
}

pub struct BaselineSubsystem<'a> {
    config: &'a GeneratorConfig,
    rng_bank: RngBank,
    calendar: SimCalendar,
    population: &'a Population,
    by_country: BTreeMap<&'a str, Vec<usize>>,
    siblings: BTreeMap<&'a str, Vec<&'a str>>,
}

impl<'a> BaselineSubsystem<'a> {
    pub fn new(
        config: &'a GeneratorConfig,
        rng_bank: RngBank,
        calendar: SimCalendar,
        population: &'a Population,
    ) -> Self {
        let mut siblings: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for account in &population.accounts {
            siblings
                .entry(account.customer_id.as_str())
                .or_default()
                .push(account.account_id.as_str());
        }
        Self {
            config,
            rng_bank,
            calendar,
            population,
            by_country: population.counterparties_by_country(),
            siblings,
        }
    }

    /// Generate the baseline stream for every account. Fails before any
    /// draw if an account names a segment that is not configured.
    pub fn generate(&self) -> SimResult<Vec<Transaction>> {
        for account in &self.population.accounts {
            self.segment_of(account)?;
        }
        let per_account = self
            .population
            .accounts
            .par_iter()
            .map(|account| self.generate_account(account))
            .collect::<SimResult<Vec<_>>>()?;
        let txns: Vec<Transaction> = per_account.into_iter().flatten().collect();
        log::info!(
            "stage=baseline accounts={} transactions={}",
            self.population.accounts.len(),
            txns.len()
        );
        Ok(txns)
    }

    /// Baseline for a single account over the whole calendar.
    pub fn generate_account(&self, account: &Account) -> SimResult<Vec<Transaction>> {
        let segment = self.segment_of(account)?;
        let Some((first, last)) = account.active_span(self.calendar.start, self.calendar.end) else {
            return Ok(Vec::new());
        };

        let activities: Vec<(&str, &ActivityConfig, f64)> = segment
            .txn_frequency
            .iter()
            .filter_map(|(name, freq)| {
                self.config
                    .activities
                    .get(name)
                    .map(|activity| (name.as_str(), activity, *freq))
            })
            .collect();
        let profile = self.profile(account, segment);

        let mut out = Vec::new();
        for day in SimCalendar::new(first, last).days() {
            let mut rng = self
                .rng_bank
                .stream(StageSlot::Baseline, &account.account_id, &day.to_string());
            let intensity =
                SimCalendar::dow_multiplier(segment, day) * SimCalendar::eom_multiplier(segment, day);
            for (name, activity, freq) in &activities {
                // One Bernoulli trial per activity per day; frequencies above
                // one a day saturate at daily.
                let p = (freq / 30.0 * intensity).min(1.0);
                if rng.chance(p) {
                    out.push(self.synthesize(account, segment, &profile, name, activity, day, &mut rng));
                }
            }
        }
        Ok(out)
    }

    fn segment_of(&self, account: &Account) -> SimResult<&'a SegmentConfig> {
        self.config.segment(&account.segment).ok_or_else(|| {
            SimError::config(format!(
                "account {} references unknown segment '{}'",
                account.account_id, account.segment
            ))
        })
    }

    fn profile(&self, account: &Account, segment: &SegmentConfig) -> AccountProfile {
        let mut rng = self
            .rng_bank
            .stream(StageSlot::Baseline, &account.account_id, "profile");
        let monthly_count: f64 = segment.txn_frequency.values().sum::<f64>().max(1.0);
        let size = account.declared_monthly_turnover / monthly_count * rng.uniform(0.6, 1.3);
        let typical_size = size.clamp(segment.avg_txn_size.min * 0.5, segment.avg_txn_size.max * 2.0);

        let home: &[usize] = self
            .by_country
            .get(account.country.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let abroad: Vec<usize> = self
            .by_country
            .iter()
            .filter(|(country, _)| **country != account.country.as_str())
            .flat_map(|(_, idx)| idx.iter().copied())
            .collect();

        let n_domestic = rng.range_inclusive(3, 8) as usize;
        let domestic = rng
            .sample_indices(home.len(), n_domestic)
            .into_iter()
            .map(|i| home[i])
            .collect();
        let n_foreign = rng.range_inclusive(1, 4) as usize;
        let foreign = rng
            .sample_indices(abroad.len(), n_foreign)
            .into_iter()
            .map(|i| abroad[i])
            .collect();

        AccountProfile {
            typical_size,
            domestic,
            foreign,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn synthesize(
        &self,
        account: &Account,
        segment: &SegmentConfig,
        profile: &AccountProfile,
        activity_name: &str,
        activity: &ActivityConfig,
        day: Day,
        rng: &mut SubsystemRng,
    ) -> Transaction {
        let direction = match activity.direction {
            ActivityDirection::Credit => Direction::Credit,
            ActivityDirection::Debit => Direction::Debit,
            ActivityDirection::Either => {
                if rng.chance(0.5) {
                    Direction::Credit
                } else {
                    Direction::Debit
                }
            }
        };
        let kind = activity.kind.resolve(direction);

        let raw = rng.log_normal(profile.typical_size, AMOUNT_SIGMA);
        let amount = if kind.is_cash() {
            ((raw / 20.0).round() * 20.0).max(20.0)
        } else {
            round_cents(raw.max(1.0))
        };

        let channel = if kind.is_cash() {
            if kind == TxnKind::CashWithdrawal && amount <= 1_000.0 && rng.chance(0.6) {
                Channel::Atm
            } else {
                Channel::Branch
            }
        } else {
            let mix: Vec<(Channel, f64)> = segment.channels.iter().map(|(c, w)| (*c, *w)).collect();
            rng.pick_weighted(&mix).copied().unwrap_or(Channel::Online)
        };

        let home = account.country.clone();
        let (counterparty_id, counterparty_account, far_country) = if kind.is_cash() {
            (CASH_COUNTERPARTY.to_string(), None, home.clone())
        } else if kind == TxnKind::InternalTransfer {
            match self.sibling_of(account, rng) {
                Some(other) => (other.to_string(), Some(other.to_string()), home.clone()),
                None => self.external_counterparty(profile, segment, &home, rng),
            }
        } else {
            self.external_counterparty(profile, segment, &home, rng)
        };
        let (origin_country, destination_country) = match direction {
            Direction::Credit => (far_country, home),
            Direction::Debit => (home, far_country),
        };

        let hour = rng.range_inclusive(BUSINESS_HOURS.0, BUSINESS_HOURS.1) as u32;
        let minute = rng.range_inclusive(0, 59) as u32;
        Transaction {
            txn_id: format!("TXN_{}", rng.uuid().simple()),
            account_id: account.account_id.clone(),
            customer_id: account.customer_id.clone(),
            timestamp: at(day, hour, minute),
            amount,
            currency: account.currency.clone(),
            direction,
            kind,
            channel,
            counterparty_id,
            counterparty_account,
            origin_country,
            destination_country,
            description: activity_name.to_string(),
        }
    }

    fn sibling_of(&self, account: &Account, rng: &mut SubsystemRng) -> Option<&'a str> {
        let others: Vec<&str> = self
            .siblings
            .get(account.customer_id.as_str())?
            .iter()
            .copied()
            .filter(|id| *id != account.account_id)
            .collect();
        rng.pick(&others).copied()
    }

    /// (counterparty id, external account ref, counterparty country).
    fn external_counterparty(
        &self,
        profile: &AccountProfile,
        segment: &SegmentConfig,
        home: &str,
        rng: &mut SubsystemRng,
    ) -> (String, Option<String>, String) {
        let mix = &segment.corridors;
        let total = mix.domestic + mix.cross_border;
        let cross_border = total > 0.0 && rng.chance(mix.cross_border / total);

        let usual = if cross_border && !profile.foreign.is_empty() {
            &profile.foreign
        } else {
            &profile.domestic
        };
        let pool = &self.population.counterparties;
        let index = if usual.is_empty() || rng.chance(NEW_COUNTERPARTY_SHARE) {
            (!pool.is_empty()).then(|| rng.index(pool.len()))
        } else {
            rng.pick(usual).copied()
        };
        match index.and_then(|i| pool.get(i)) {
            Some(cp) => (
                cp.counterparty_id.clone(),
                Some(cp.account_ref.clone()),
                cp.country.clone(),
            ),
            None => (CASH_COUNTERPARTY.to_string(), None, home.to_string()),
        }
    }
}
