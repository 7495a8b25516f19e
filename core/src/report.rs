//! Run quality report: counts per stage, tier distribution against the
//! calibration targets, detection quality and the non-fatal shortfalls.

use crate::{
    config::TierShares,
    types::{Day, Disposition, RiskTier, RunId, Typology},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fewer qualifying accounts than requested. Recorded, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shortfall {
    pub context: String,
    pub requested: usize,
    pub available: usize,
}

impl Shortfall {
    pub fn new(context: impl Into<String>, requested: usize, available: usize) -> Self {
        Self {
            context: context.into(),
            requested,
            available,
        }
    }
}

impl fmt::Display for Shortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: requested {}, available {}",
            self.context, self.requested, self.available
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierDistribution {
    pub total: usize,
    pub counts: BTreeMap<RiskTier, usize>,
    pub shares: BTreeMap<RiskTier, f64>,
    pub targets: TierShares,
    /// Largest absolute gap between a realized share and its target.
    pub max_deviation: f64,
    pub within_tolerance: bool,
}

impl TierDistribution {
    pub fn measure(tiers: impl Iterator<Item = RiskTier>, targets: &TierShares, tolerance: f64) -> Self {
        let mut counts: BTreeMap<RiskTier, usize> = RiskTier::ALL.iter().map(|t| (*t, 0)).collect();
        let mut total = 0;
        for tier in tiers {
            *counts.entry(tier).or_insert(0) += 1;
            total += 1;
        }
        let shares: BTreeMap<RiskTier, f64> = counts
            .iter()
            .map(|(tier, n)| {
                let share = if total == 0 { 0.0 } else { *n as f64 / total as f64 };
                (*tier, share)
            })
            .collect();
        let max_deviation = if total == 0 {
            0.0
        } else {
            RiskTier::ALL
                .iter()
                .map(|t| (shares[t] - targets.share(*t)).abs())
                .fold(0.0, f64::max)
        };
        Self {
            total,
            counts,
            shares,
            targets: *targets,
            max_deviation,
            within_tolerance: max_deviation <= tolerance + 1e-9,
        }
    }

    pub fn count(&self, tier: RiskTier) -> usize {
        self.counts.get(&tier).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub run_id: RunId,
    pub seed: u64,
    pub as_of: Day,
    pub customers: usize,
    pub accounts: usize,
    pub counterparties: usize,
    pub baseline_transactions: usize,
    pub injected_transactions: usize,
    pub scenarios_by_typology: BTreeMap<Typology, usize>,
    pub news_items: usize,
    pub signal_records: usize,
    pub alerts: TierDistribution,
    pub filler_alerts: usize,
    pub true_positive_alerts: usize,
    pub false_positive_alerts: usize,
    pub precision: f64,
    pub cases_opened: usize,
    pub cases_still_open: usize,
    pub dispositions: BTreeMap<Disposition, usize>,
    pub shortfalls: Vec<Shortfall>,
}

impl QualityReport {
    /// A run with warnings still produced valid output.
    pub fn has_warnings(&self) -> bool {
        !self.shortfalls.is_empty() || !self.alerts.within_tolerance
    }

    pub fn scenario_count(&self) -> usize {
        self.scenarios_by_typology.values().sum()
    }
}
