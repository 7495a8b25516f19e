//! Generator configuration: segment behaviour profiles, region risk tables,
//! typology parameter ranges, alert rule definitions, calibration targets,
//! noise settings and case disposition tables.
//!
//! RULE: Every table is validated before the first draw is made.
//! A bad table is a fatal `SimError::Configuration`, never a silent skip.

use crate::{
    error::{SimError, SimResult},
    rules::{RuleDef, RuleSet},
    types::{Channel, Direction, Disposition, RiskTier, TxnKind, Typology},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Shared shapes ────────────────────────────────────────────────────────────

/// Inclusive integer range, e.g. a transaction count or a span of days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CountSpan {
    pub min: u32,
    pub max: u32,
}

impl CountSpan {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    fn check(&self, what: &str) -> SimResult<()> {
        if self.min > self.max {
            return Err(SimError::config(format!(
                "{what}: min {} exceeds max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Half-open float range [min, max).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Span {
    pub min: f64,
    pub max: f64,
}

impl Span {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn check(&self, what: &str) -> SimResult<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(SimError::config(format!(
                "{what}: invalid range [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

fn check_probability(value: f64, what: &str) -> SimResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SimError::config(format!(
            "{what}: probability {value} outside [0, 1]"
        )));
    }
    Ok(())
}

fn check_weights<'a>(weights: impl Iterator<Item = &'a f64>, what: &str) -> SimResult<()> {
    let mut total = 0.0;
    for w in weights {
        if !w.is_finite() || *w < 0.0 {
            return Err(SimError::config(format!("{what}: invalid weight {w}")));
        }
        total += w;
    }
    if total <= 0.0 {
        return Err(SimError::config(format!("{what}: weights sum to zero")));
    }
    Ok(())
}

// ── Activities and segments ──────────────────────────────────────────────────

/// How a catalog activity is booked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Wire,
    Ach,
    Cash,
    Check,
    Card,
    InternalTransfer,
    Fx,
}

impl ActivityKind {
    /// Cash resolves to deposit or withdrawal depending on direction.
    pub fn resolve(self, direction: Direction) -> TxnKind {
        match self {
            Self::Wire => TxnKind::Wire,
            Self::Ach => TxnKind::Ach,
            Self::Cash => match direction {
                Direction::Credit => TxnKind::CashDeposit,
                Direction::Debit => TxnKind::CashWithdrawal,
            },
            Self::Check => TxnKind::Check,
            Self::Card => TxnKind::Card,
            Self::InternalTransfer => TxnKind::InternalTransfer,
            Self::Fx => TxnKind::Fx,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityDirection {
    Credit,
    Debit,
    Either,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub kind: ActivityKind,
    pub direction: ActivityDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorridorMix {
    pub domestic: f64,
    pub cross_border: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub id: String,
    pub label: String,
    pub population_share: f64,
    /// KYC-declared monthly turnover is drawn from this range.
    pub monthly_volume_range: Span,
    /// Activity name -> expected occurrences per month.
    pub txn_frequency: BTreeMap<String, f64>,
    pub channels: BTreeMap<Channel, f64>,
    pub corridors: CorridorMix,
    pub avg_txn_size: Span,
    pub risk_weight: f64,
    pub accounts_per_customer: CountSpan,
    /// Monday-first day-of-week activity multipliers.
    pub dow_multipliers: [f64; 7],
    pub eom_multiplier: f64,
    pub eom_window_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct SegmentsFile {
    activities: BTreeMap<String, ActivityConfig>,
    segments: Vec<SegmentConfig>,
}

// ── Regions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryConfig {
    pub weight: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub countries: BTreeMap<String, CountryConfig>,
    pub country_risk: BTreeMap<String, f64>,
    pub default_country_risk: f64,
    pub high_risk_jurisdictions: Vec<String>,
    pub offshore_jurisdictions: Vec<String>,
    /// Currency -> cash reporting threshold.
    pub reporting_thresholds: BTreeMap<String, f64>,
}

impl RegionConfig {
    pub fn country_risk(&self, country: &str) -> f64 {
        self.country_risk
            .get(country)
            .copied()
            .unwrap_or(self.default_country_risk)
    }

    pub fn reporting_threshold(&self, currency: &str) -> Option<f64> {
        self.reporting_thresholds.get(currency).copied()
    }

    pub fn is_high_risk(&self, country: &str) -> bool {
        self.high_risk_jurisdictions.iter().any(|c| c == country)
    }

    pub fn is_offshore(&self, country: &str) -> bool {
        self.offshore_jurisdictions.iter().any(|c| c == country)
    }

    pub fn currency_of(&self, country: &str) -> &str {
        self.countries
            .get(country)
            .map(|c| c.currency.as_str())
            .unwrap_or("USD")
    }
}

// ── Typologies ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuringParams {
    /// Used for currencies without an entry in the region reporting thresholds.
    pub threshold: f64,
    pub margin: f64,
    /// Amounts stay at least this far below the threshold.
    pub small_offset: f64,
    pub transactions: CountSpan,
    pub timeframe_days: CountSpan,
    pub branch_share: f64,
    pub business_hours: CountSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapidMovementParams {
    pub inbound_amount: Span,
    pub velocity_hours: CountSpan,
    pub retention: Span,
    pub hops: CountSpan,
    pub cross_border_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanParams {
    pub counterparties: CountSpan,
    pub timeframe_days: CountSpan,
    pub base_amount: Span,
    pub amount_variance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleParams {
    pub length: CountSpan,
    pub decay: Span,
    pub timeframe_days: CountSpan,
    pub amount: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuleParams {
    pub account_age_days: CountSpan,
    pub window_days: u32,
    pub spike_multiplier: Span,
    pub counterparties: CountSpan,
    pub cash_withdrawals: CountSpan,
    pub withdrawal_amount: Span,
    pub pass_through: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorridorParams {
    pub jurisdictions: Vec<String>,
    pub transactions: CountSpan,
    pub amount: Span,
    pub window_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashIntensiveParams {
    pub deposits: CountSpan,
    pub window_days: u32,
    pub near_threshold_share: f64,
    pub near_threshold_gap: Span,
    pub small_amount: Span,
    pub round_share: f64,
}

/// Where in the run window pattern instances land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementParams {
    /// Probability an instance is placed entirely inside the last
    /// `signals.short_window_days` before the as-of date.
    pub recent_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypologyConfig {
    pub placement: PlacementParams,
    pub structuring: StructuringParams,
    pub rapid_movement: RapidMovementParams,
    pub fan_in: FanParams,
    pub fan_out: FanParams,
    pub cycle: CycleParams,
    pub mule: MuleParams,
    pub high_risk_corridor: CorridorParams,
    pub cash_intensive: CashIntensiveParams,
}

/// Which accounts a typology may be injected into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    Random,
    HighRisk,
    NewAccounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionPlan {
    pub typology: Typology,
    pub selection: SelectionPolicy,
    /// Fraction of the account population that receives this pattern.
    pub prevalence: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct TypologiesFile {
    params: TypologyConfig,
    injections: Vec<InjectionPlan>,
}

// ── Run, population, signals, calibration, cases ─────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub seed: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Observation date for signals and alerts. Defaults to `end_date`.
    #[serde(default)]
    pub as_of_date: Option<NaiveDate>,
    pub customers: u32,
}

impl RunConfig {
    pub fn as_of(&self) -> NaiveDate {
        self.as_of_date.unwrap_or(self.end_date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub new_account_share: f64,
    pub closed_account_share: f64,
    /// Days between onboarding and the start of the run.
    pub history_days: CountSpan,
    /// Days since the last KYC refresh, measured back from the as-of date.
    pub kyc_refresh_age_days: CountSpan,
    pub counterparty_ratio: f64,
    pub counterparty_company_share: f64,
    pub counterparty_high_risk_share: f64,
    pub counterparty_pep_rate: f64,
    pub counterparty_sanctions_rate: f64,
    pub hnw_pep_rate: f64,
    pub sanctions_rate: f64,
    pub adverse_media_rate: f64,
    pub pep_adverse_media_rate: f64,
    pub critical_media_share: f64,
    pub media_items: CountSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub noise_coefficient: f64,
    pub short_window_days: u32,
    pub long_window_days: u32,
    /// Fraction below the reporting threshold that counts as "near".
    pub near_threshold_band: f64,
    pub rapid_window_hours: u32,
    pub rapid_match: Span,
    pub rapid_min_leg_share: f64,
    pub round_amount_unit: f64,
    pub min_history_months: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierShares {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl TierShares {
    pub fn share(&self, tier: RiskTier) -> f64 {
        match tier {
            RiskTier::Low => self.low,
            RiskTier::Medium => self.medium,
            RiskTier::High => self.high,
            RiskTier::Critical => self.critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub enabled: bool,
    pub targets: TierShares,
    /// Allowed absolute deviation per tier, as a fraction (0.05 = 5 points).
    pub tolerance: f64,
    pub filler_score: Span,
}

pub type DispositionWeights = BTreeMap<Disposition, f64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispositionTables {
    pub true_positive: BTreeMap<RiskTier, DispositionWeights>,
    pub false_positive: BTreeMap<RiskTier, DispositionWeights>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseConfig {
    pub low_tier_case_probability: f64,
    pub open_delay_days: CountSpan,
    pub investigation_days: CountSpan,
    /// Cases that would close after as-of + horizon remain open.
    pub review_horizon_days: u32,
    pub dispositions: DispositionTables,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerationFile {
    run: RunConfig,
    population: PopulationConfig,
    signals: SignalConfig,
    calibration: CalibrationConfig,
    cases: CaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct RulesFile {
    rules: Vec<RuleDef>,
}

// ── Aggregate ────────────────────────────────────────────────────────────────

/// Raw JSON text of each configuration table.
pub struct ConfigSources<'a> {
    pub segments: &'a str,
    pub regions: &'a str,
    pub typologies: &'a str,
    pub rules: &'a str,
    pub generation: &'a str,
}

const CONFIG_FILES: [&str; 5] = [
    "segments.json",
    "regions.json",
    "typologies.json",
    "rules.json",
    "generation.json",
];

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub run: RunConfig,
    pub activities: BTreeMap<String, ActivityConfig>,
    pub segments: Vec<SegmentConfig>,
    pub regions: RegionConfig,
    pub typologies: TypologyConfig,
    pub injections: Vec<InjectionPlan>,
    pub rules: Vec<RuleDef>,
    pub population: PopulationConfig,
    pub signals: SignalConfig,
    pub calibration: CalibrationConfig,
    pub cases: CaseConfig,
}

impl GeneratorConfig {
    /// Load from the data/ directory.
    /// In tests, use GeneratorConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let mut texts = Vec::with_capacity(CONFIG_FILES.len());
        for file in CONFIG_FILES {
            let path = format!("{data_dir}/{file}");
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
            texts.push(content);
        }
        let config = Self::parse(&ConfigSources {
            segments: &texts[0],
            regions: &texts[1],
            typologies: &texts[2],
            rules: &texts[3],
            generation: &texts[4],
        })?;
        Ok(config)
    }

    /// The default tables compiled into the binary.
    pub fn embedded() -> SimResult<Self> {
        Self::parse(&ConfigSources {
            segments: include_str!("../../data/segments.json"),
            regions: include_str!("../../data/regions.json"),
            typologies: include_str!("../../data/typologies.json"),
            rules: include_str!("../../data/rules.json"),
            generation: include_str!("../../data/generation.json"),
        })
    }

    /// Parse and validate every table. Any missing field or bad value is a
    /// configuration error naming the table it came from.
    pub fn parse(sources: &ConfigSources<'_>) -> SimResult<Self> {
        let segments: SegmentsFile = parse_table(sources.segments, "segments.json")?;
        let regions: RegionConfig = parse_table(sources.regions, "regions.json")?;
        let typologies: TypologiesFile = parse_table(sources.typologies, "typologies.json")?;
        let rules: RulesFile = parse_table(sources.rules, "rules.json")?;
        let generation: GenerationFile = parse_table(sources.generation, "generation.json")?;

        let config = Self {
            run: generation.run,
            activities: segments.activities,
            segments: segments.segments,
            regions,
            typologies: typologies.params,
            injections: typologies.injections,
            rules: rules.rules,
            population: generation.population,
            signals: generation.signals,
            calibration: generation.calibration,
            cases: generation.cases,
        };
        config.validate()?;
        Ok(config)
    }

    /// Embedded tables shrunk to a short window and a small population.
    pub fn default_test() -> SimResult<Self> {
        let mut config = Self::embedded()?;
        config.run.customers = 120;
        config.run.start_date = date(2024, 1, 1);
        config.run.end_date = date(2024, 6, 30);
        config.run.as_of_date = None;
        config.validate()?;
        Ok(config)
    }

    pub fn segment(&self, id: &str) -> Option<&SegmentConfig> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// Cash reporting threshold for a currency, falling back to the
    /// structuring default.
    pub fn reporting_threshold(&self, currency: &str) -> f64 {
        self.regions
            .reporting_threshold(currency)
            .unwrap_or(self.typologies.structuring.threshold)
    }

    pub fn compile_rules(&self) -> SimResult<RuleSet> {
        RuleSet::compile(&self.rules)
    }

    /// Fail-fast validation of every table.
    pub fn validate(&self) -> SimResult<()> {
        self.validate_run()?;
        self.validate_segments()?;
        self.validate_regions()?;
        self.validate_typologies()?;
        self.compile_rules()?;
        self.validate_signals()?;
        self.validate_calibration()?;
        self.validate_cases()?;
        Ok(())
    }

    fn validate_run(&self) -> SimResult<()> {
        let run = &self.run;
        if run.end_date < run.start_date {
            return Err(SimError::config(format!(
                "run: end_date {} precedes start_date {}",
                run.end_date, run.start_date
            )));
        }
        if run.as_of() < run.start_date {
            return Err(SimError::config(format!(
                "run: as_of_date {} precedes start_date {}",
                run.as_of(),
                run.start_date
            )));
        }
        if run.customers == 0 {
            return Err(SimError::config("run: customers must be positive"));
        }
        let p = &self.population;
        check_probability(p.new_account_share, "population.new_account_share")?;
        check_probability(p.closed_account_share, "population.closed_account_share")?;
        check_probability(p.counterparty_company_share, "population.counterparty_company_share")?;
        check_probability(p.counterparty_high_risk_share, "population.counterparty_high_risk_share")?;
        check_probability(p.counterparty_pep_rate, "population.counterparty_pep_rate")?;
        check_probability(p.counterparty_sanctions_rate, "population.counterparty_sanctions_rate")?;
        check_probability(p.hnw_pep_rate, "population.hnw_pep_rate")?;
        check_probability(p.sanctions_rate, "population.sanctions_rate")?;
        check_probability(p.adverse_media_rate, "population.adverse_media_rate")?;
        check_probability(p.pep_adverse_media_rate, "population.pep_adverse_media_rate")?;
        check_probability(p.critical_media_share, "population.critical_media_share")?;
        p.history_days.check("population.history_days")?;
        p.kyc_refresh_age_days.check("population.kyc_refresh_age_days")?;
        p.media_items.check("population.media_items")?;
        if p.counterparty_ratio <= 0.0 {
            return Err(SimError::config("population.counterparty_ratio must be positive"));
        }
        Ok(())
    }

    fn validate_segments(&self) -> SimResult<()> {
        if self.segments.is_empty() {
            return Err(SimError::config("segments: no segments defined"));
        }
        check_weights(
            self.segments.iter().map(|s| &s.population_share),
            "segments.population_share",
        )?;
        for seg in &self.segments {
            let ctx = format!("segment '{}'", seg.id);
            if seg.txn_frequency.is_empty() {
                return Err(SimError::config(format!("{ctx}: txn_frequency is empty")));
            }
            for (activity, freq) in &seg.txn_frequency {
                if !self.activities.contains_key(activity) {
                    return Err(SimError::config(format!(
                        "{ctx}: unknown activity '{activity}'"
                    )));
                }
                if !freq.is_finite() || *freq < 0.0 {
                    return Err(SimError::config(format!(
                        "{ctx}: invalid frequency {freq} for '{activity}'"
                    )));
                }
            }
            if seg.channels.is_empty() {
                return Err(SimError::config(format!("{ctx}: channel mix is empty")));
            }
            check_weights(seg.channels.values(), &format!("{ctx}.channels"))?;
            check_weights(
                [seg.corridors.domestic, seg.corridors.cross_border].iter(),
                &format!("{ctx}.corridors"),
            )?;
            seg.avg_txn_size.check(&format!("{ctx}.avg_txn_size"))?;
            seg.monthly_volume_range
                .check(&format!("{ctx}.monthly_volume_range"))?;
            seg.accounts_per_customer
                .check(&format!("{ctx}.accounts_per_customer"))?;
            if seg.accounts_per_customer.min == 0 {
                return Err(SimError::config(format!(
                    "{ctx}: accounts_per_customer.min must be at least 1"
                )));
            }
            if seg.dow_multipliers.iter().any(|m| !m.is_finite() || *m < 0.0) {
                return Err(SimError::config(format!("{ctx}: invalid dow_multipliers")));
            }
            if !seg.eom_multiplier.is_finite() || seg.eom_multiplier < 0.0 {
                return Err(SimError::config(format!("{ctx}: invalid eom_multiplier")));
            }
        }
        Ok(())
    }

    fn validate_regions(&self) -> SimResult<()> {
        let r = &self.regions;
        if r.countries.is_empty() {
            return Err(SimError::config("regions: no countries defined"));
        }
        check_weights(r.countries.values().map(|c| &c.weight), "regions.countries")?;
        if r.reporting_thresholds.values().any(|t| *t <= 0.0) {
            return Err(SimError::config("regions: reporting thresholds must be positive"));
        }
        Ok(())
    }

    fn validate_typologies(&self) -> SimResult<()> {
        let t = &self.typologies;
        check_probability(t.placement.recent_share, "placement.recent_share")?;

        let s = &t.structuring;
        s.transactions.check("structuring.transactions")?;
        s.timeframe_days.check("structuring.timeframe_days")?;
        s.business_hours.check("structuring.business_hours")?;
        check_probability(s.branch_share, "structuring.branch_share")?;
        if s.threshold <= 0.0 || s.margin <= 0.0 {
            return Err(SimError::config("structuring: threshold and margin must be positive"));
        }
        if s.small_offset < 0.0 || s.small_offset >= s.margin {
            return Err(SimError::config(format!(
                "structuring: small_offset {} must lie in [0, margin {})",
                s.small_offset, s.margin
            )));
        }
        if s.timeframe_days.min == 0 || s.transactions.min == 0 {
            return Err(SimError::config("structuring: counts must be at least 1"));
        }

        let r = &t.rapid_movement;
        r.inbound_amount.check("rapid_movement.inbound_amount")?;
        r.velocity_hours.check("rapid_movement.velocity_hours")?;
        r.retention.check("rapid_movement.retention")?;
        r.hops.check("rapid_movement.hops")?;
        check_probability(r.cross_border_share, "rapid_movement.cross_border_share")?;
        if r.retention.min <= 0.0 || r.retention.max > 1.0 {
            return Err(SimError::config(format!(
                "rapid_movement.retention: [{}, {}] must lie within (0, 1]",
                r.retention.min, r.retention.max
            )));
        }
        if r.hops.min == 0 {
            return Err(SimError::config("rapid_movement.hops must be at least 1"));
        }

        for (name, fan) in [("fan_in", &t.fan_in), ("fan_out", &t.fan_out)] {
            fan.counterparties.check(&format!("{name}.counterparties"))?;
            fan.timeframe_days.check(&format!("{name}.timeframe_days"))?;
            fan.base_amount.check(&format!("{name}.base_amount"))?;
            if !(0.0..1.0).contains(&fan.amount_variance) {
                return Err(SimError::config(format!(
                    "{name}.amount_variance must lie in [0, 1)"
                )));
            }
            if fan.timeframe_days.min == 0 || fan.counterparties.min == 0 {
                return Err(SimError::config(format!("{name}: counts must be at least 1")));
            }
        }

        let c = &t.cycle;
        c.length.check("cycle.length")?;
        c.decay.check("cycle.decay")?;
        c.timeframe_days.check("cycle.timeframe_days")?;
        c.amount.check("cycle.amount")?;
        if c.length.min < 2 {
            return Err(SimError::config("cycle.length must be at least 2"));
        }
        if c.decay.min <= 0.0 || c.decay.max > 1.0 {
            return Err(SimError::config("cycle.decay must lie within (0, 1]"));
        }

        let m = &t.mule;
        m.account_age_days.check("mule.account_age_days")?;
        m.spike_multiplier.check("mule.spike_multiplier")?;
        m.counterparties.check("mule.counterparties")?;
        m.cash_withdrawals.check("mule.cash_withdrawals")?;
        m.withdrawal_amount.check("mule.withdrawal_amount")?;
        m.pass_through.check("mule.pass_through")?;
        if m.counterparties.min < 2 {
            return Err(SimError::config("mule: needs at least 2 counterparties"));
        }
        if m.window_days < 3 {
            return Err(SimError::config("mule.window_days must be at least 3"));
        }
        if m.pass_through.max > 1.0 {
            return Err(SimError::config("mule.pass_through must not exceed 1"));
        }

        let k = &t.high_risk_corridor;
        k.transactions.check("high_risk_corridor.transactions")?;
        k.amount.check("high_risk_corridor.amount")?;
        if k.jurisdictions.is_empty() || k.window_days == 0 {
            return Err(SimError::config(
                "high_risk_corridor: needs jurisdictions and a non-empty window",
            ));
        }

        let h = &t.cash_intensive;
        h.deposits.check("cash_intensive.deposits")?;
        h.near_threshold_gap.check("cash_intensive.near_threshold_gap")?;
        h.small_amount.check("cash_intensive.small_amount")?;
        check_probability(h.near_threshold_share, "cash_intensive.near_threshold_share")?;
        check_probability(h.round_share, "cash_intensive.round_share")?;
        if h.window_days == 0 {
            return Err(SimError::config("cash_intensive.window_days must be positive"));
        }

        for plan in &self.injections {
            check_probability(plan.prevalence, &format!("injection {}", plan.typology))?;
        }
        Ok(())
    }

    fn validate_signals(&self) -> SimResult<()> {
        let s = &self.signals;
        if !s.noise_coefficient.is_finite() || s.noise_coefficient < 0.0 {
            return Err(SimError::config("signals.noise_coefficient must be non-negative"));
        }
        if s.short_window_days == 0 || s.long_window_days < s.short_window_days {
            return Err(SimError::config(
                "signals: long_window_days must be at least short_window_days > 0",
            ));
        }
        check_probability(s.near_threshold_band, "signals.near_threshold_band")?;
        check_probability(s.rapid_min_leg_share, "signals.rapid_min_leg_share")?;
        s.rapid_match.check("signals.rapid_match")?;
        if s.round_amount_unit <= 0.0 {
            return Err(SimError::config("signals.round_amount_unit must be positive"));
        }
        Ok(())
    }

    fn validate_calibration(&self) -> SimResult<()> {
        let c = &self.calibration;
        let t = c.targets;
        for tier in RiskTier::ALL {
            check_probability(t.share(tier), &format!("calibration.targets.{tier}"))?;
        }
        let total = t.low + t.medium + t.high + t.critical;
        if (total - 1.0).abs() > 1e-6 {
            return Err(SimError::config(format!(
                "calibration.targets sum to {total}, expected 1.0"
            )));
        }
        if t.low >= 1.0 {
            return Err(SimError::config("calibration.targets.low must leave room for other tiers"));
        }
        check_probability(c.tolerance, "calibration.tolerance")?;
        c.filler_score.check("calibration.filler_score")?;
        Ok(())
    }

    fn validate_cases(&self) -> SimResult<()> {
        let c = &self.cases;
        check_probability(c.low_tier_case_probability, "cases.low_tier_case_probability")?;
        c.open_delay_days.check("cases.open_delay_days")?;
        c.investigation_days.check("cases.investigation_days")?;
        for (label, table) in [
            ("true_positive", &c.dispositions.true_positive),
            ("false_positive", &c.dispositions.false_positive),
        ] {
            for tier in RiskTier::ALL {
                let row = table.get(&tier).ok_or_else(|| {
                    SimError::config(format!("cases.dispositions.{label}: missing tier {tier}"))
                })?;
                check_weights(row.values(), &format!("cases.dispositions.{label}.{tier}"))?;
            }
        }
        Ok(())
    }
}

fn parse_table<T: serde::de::DeserializeOwned>(text: &str, file: &str) -> SimResult<T> {
    serde_json::from_str(text).map_err(|e| SimError::config(format!("{file}: {e}")))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}
