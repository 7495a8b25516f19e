//! Customers, accounts and the external counterparty pool.
//!
//! RULE: Declared (KYC) fields are written once here and never updated from
//! observed behaviour. The gap between declared and actual turnover is
//! something the signal layer is supposed to find.

use crate::{
    clock::{add_days, SimCalendar},
    config::{GeneratorConfig, SegmentConfig},
    error::{SimError, SimResult},
    name_generator::NameGenerator,
    rng::{RngBank, StageSlot, SubsystemRng},
    types::{round_cents, Day, EntityId, RiskTier},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub customer_id: EntityId,
    pub name: String,
    pub segment: String,
    pub country: String,
    pub is_pep: bool,
    pub is_sanctioned: bool,
    pub onboarding_date: Day,
    pub kyc_date: Day,
    pub risk_score: f64,
    pub risk_rating: RiskTier,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub account_id: EntityId,
    pub customer_id: EntityId,
    pub segment: String,
    pub currency: String,
    pub country: String,
    pub open_date: Day,
    /// First day on which the account no longer books anything.
    pub close_date: Option<Day>,
    pub declared_monthly_turnover: f64,
}

impl Account {
    /// Open on `day`: open_date <= day < close_date.
    pub fn is_active_on(&self, day: Day) -> bool {
        day >= self.open_date && self.close_date.map_or(true, |close| day < close)
    }

    /// First and last day the account can book anything in `[lo, hi]`,
    /// or None when the two ranges do not overlap.
    pub fn active_span(&self, lo: Day, hi: Day) -> Option<(Day, Day)> {
        let first = lo.max(self.open_date);
        let last = match self.close_date.and_then(|c| c.pred_opt()) {
            Some(final_day) => hi.min(final_day),
            None => hi,
        };
        (first <= last).then_some((first, last))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyKind {
    Person,
    Company,
}

impl CounterpartyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Company => "company",
        }
    }
}

/// A party outside the bank. Only its reference, country and screening
/// flags are known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Counterparty {
    pub counterparty_id: EntityId,
    pub name: String,
    pub kind: CounterpartyKind,
    pub country: String,
    pub bank_name: String,
    pub account_ref: String,
    pub is_pep: bool,
    pub is_sanctioned: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Population {
    pub customers: Vec<Customer>,
    pub accounts: Vec<Account>,
    pub counterparties: Vec<Counterparty>,
}

impl Population {
    pub fn customer(&self, customer_id: &str) -> Option<&Customer> {
        self.customers
            .binary_search_by(|c| c.customer_id.as_str().cmp(customer_id))
            .ok()
            .map(|i| &self.customers[i])
    }

    pub fn account(&self, account_id: &str) -> Option<&Account> {
        self.accounts
            .binary_search_by(|a| a.account_id.as_str().cmp(account_id))
            .ok()
            .map(|i| &self.accounts[i])
    }

    pub fn counterparty(&self, counterparty_id: &str) -> Option<&Counterparty> {
        self.counterparties
            .binary_search_by(|c| c.counterparty_id.as_str().cmp(counterparty_id))
            .ok()
            .map(|i| &self.counterparties[i])
    }

    /// Counterparty indices grouped by country.
    pub fn counterparties_by_country(&self) -> BTreeMap<&str, Vec<usize>> {
        let mut index: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, cp) in self.counterparties.iter().enumerate() {
            index.entry(cp.country.as_str()).or_default().push(i);
        }
        index
    }
}

/// Builds the synthetic population. Ids are sequential and zero-padded so
/// lexical order equals creation order.
pub struct PopulationSubsystem<'a> {
    config: &'a GeneratorConfig,
    rng_bank: RngBank,
    calendar: SimCalendar,
}

impl<'a> PopulationSubsystem<'a> {
    pub fn new(config: &'a GeneratorConfig, rng_bank: RngBank, calendar: SimCalendar) -> Self {
        Self {
            config,
            rng_bank,
            calendar,
        }
    }

    pub fn generate(&self) -> SimResult<Population> {
        let mut population = Population::default();
        let mut next_account = 1u32;

        for i in 1..=self.config.run.customers {
            let customer_id = format!("CUST_{i:08}");
            let mut rng = self
                .rng_bank
                .stream(StageSlot::Population, &customer_id, "customer");
            let segment = self.pick_segment(&mut rng)?;
            let customer = self.build_customer(&customer_id, segment, &mut rng);

            let n_accounts = rng.range_inclusive(
                segment.accounts_per_customer.min as u64,
                segment.accounts_per_customer.max as u64,
            );
            for slot in 0..n_accounts {
                let account_id = format!("ACCT_{next_account:08}");
                next_account += 1;
                population
                    .accounts
                    .push(self.build_account(&account_id, &customer, segment, slot == 0, &mut rng));
            }
            population.customers.push(customer);
        }

        let n_counterparties =
            ((self.config.run.customers as f64) * self.config.population.counterparty_ratio)
                .ceil()
                .max(1.0) as u32;
        for i in 1..=n_counterparties {
            population.counterparties.push(self.build_counterparty(i));
        }

        log::info!(
            "stage=population customers={} accounts={} counterparties={}",
            population.customers.len(),
            population.accounts.len(),
            population.counterparties.len()
        );
        Ok(population)
    }

    fn pick_segment(&self, rng: &mut SubsystemRng) -> SimResult<&'a SegmentConfig> {
        let table: Vec<(&SegmentConfig, f64)> = self
            .config
            .segments
            .iter()
            .map(|s| (s, s.population_share))
            .collect();
        rng.pick_weighted(&table)
            .copied()
            .ok_or_else(|| SimError::config("segments: population shares sum to zero"))
    }

    fn pick_country(&self, rng: &mut SubsystemRng) -> String {
        let table: Vec<(&str, f64)> = self
            .config
            .regions
            .countries
            .iter()
            .map(|(code, c)| (code.as_str(), c.weight))
            .collect();
        rng.pick_weighted(&table)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "US".into())
    }

    fn build_customer(&self, customer_id: &str, segment: &SegmentConfig, rng: &mut SubsystemRng) -> Customer {
        let pop = &self.config.population;
        let country = self.pick_country(rng);
        let is_company = matches!(
            segment.id.as_str(),
            "smb" | "corporate" | "correspondent" | "ngo" | "msb"
        );
        let name = if segment.id == "correspondent" {
            NameGenerator::bank_name(rng)
        } else if is_company {
            NameGenerator::company_name(rng)
        } else {
            NameGenerator::person_name(rng)
        };

        let is_pep = segment.id == "pep" || (segment.id == "hnw" && rng.chance(pop.hnw_pep_rate));
        let is_sanctioned = rng.chance(pop.sanctions_rate);

        let onboarding_date = if rng.chance(pop.new_account_share) {
            let offset = rng.index(self.calendar.len_days().max(1) as usize) as i64;
            add_days(self.calendar.start, offset)
        } else {
            let back = rng.range_inclusive(pop.history_days.min as u64, pop.history_days.max as u64);
            add_days(self.calendar.start, -(back as i64))
        };

        let kyc_back = rng.range_inclusive(
            pop.kyc_refresh_age_days.min as u64,
            pop.kyc_refresh_age_days.max as u64,
        );
        let kyc_date = add_days(self.config.run.as_of(), -(kyc_back as i64)).max(onboarding_date);

        let risk_score = self.risk_score(&country, segment, is_pep, is_sanctioned);
        Customer {
            customer_id: customer_id.to_string(),
            name,
            segment: segment.id.clone(),
            country,
            is_pep,
            is_sanctioned,
            onboarding_date,
            kyc_date,
            risk_score,
            risk_rating: rating_for(risk_score),
        }
    }

    /// Onboarding risk: country, segment weight and screening hits.
    /// Adverse media arrives later from the news provider and is not part of it.
    fn risk_score(&self, country: &str, segment: &SegmentConfig, is_pep: bool, is_sanctioned: bool) -> f64 {
        let mut score = self.config.regions.country_risk(country) * 0.5;
        score += (segment.risk_weight - 1.0).max(0.0) * 15.0;
        if is_pep {
            score += 20.0;
        }
        if is_sanctioned {
            score += 50.0;
        }
        round_cents(score.min(100.0))
    }

    fn build_account(
        &self,
        account_id: &str,
        customer: &Customer,
        segment: &SegmentConfig,
        primary: bool,
        rng: &mut SubsystemRng,
    ) -> Account {
        let onboarding = customer.onboarding_date;
        let open_date = if primary || onboarding >= self.calendar.start {
            onboarding
        } else {
            let gap = (self.calendar.start - onboarding).num_days().max(0) as u64;
            add_days(onboarding, rng.range_inclusive(0, gap) as i64)
        };

        let earliest_close = add_days(open_date.max(self.calendar.start), 30);
        let close_date = if rng.chance(self.config.population.closed_account_share)
            && earliest_close < self.calendar.end
        {
            let span = (self.calendar.end - earliest_close).num_days() as u64;
            Some(add_days(earliest_close, rng.range_inclusive(1, span) as i64))
        } else {
            None
        };

        let range = segment.monthly_volume_range;
        Account {
            account_id: account_id.to_string(),
            customer_id: customer.customer_id.clone(),
            segment: segment.id.clone(),
            currency: self.config.regions.currency_of(&customer.country).to_string(),
            country: customer.country.clone(),
            open_date,
            close_date,
            declared_monthly_turnover: round_cents(rng.uniform(range.min, range.max)),
        }
    }

    fn build_counterparty(&self, index: u32) -> Counterparty {
        let pop = &self.config.population;
        let counterparty_id = format!("CP_{index:08}");
        let mut rng = self
            .rng_bank
            .stream(StageSlot::Population, &counterparty_id, "counterparty");

        let high_risk = &self.config.regions.high_risk_jurisdictions;
        let country = if !high_risk.is_empty() && rng.chance(pop.counterparty_high_risk_share) {
            rng.pick(high_risk).cloned().unwrap_or_else(|| self.pick_country(&mut rng))
        } else {
            self.pick_country(&mut rng)
        };
        let kind = if rng.chance(pop.counterparty_company_share) {
            CounterpartyKind::Company
        } else {
            CounterpartyKind::Person
        };
        let name = match kind {
            CounterpartyKind::Company => NameGenerator::company_name(&mut rng),
            CounterpartyKind::Person => NameGenerator::person_name(&mut rng),
        };
        Counterparty {
            counterparty_id,
            name,
            kind,
            bank_name: NameGenerator::bank_name(&mut rng),
            account_ref: format!("EXT_{:012}", rng.next_u64_below(1_000_000_000_000)),
            is_pep: rng.chance(pop.counterparty_pep_rate),
            is_sanctioned: rng.chance(pop.counterparty_sanctions_rate),
            country,
        }
    }
}

fn rating_for(score: f64) -> RiskTier {
    if score >= 75.0 {
        RiskTier::Critical
    } else if score >= 50.0 {
        RiskTier::High
    } else if score >= 25.0 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}
