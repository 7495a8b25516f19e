//! The scenario registry: ground truth for every injected pattern instance.
//!
//! RULE: Only the typology stage appends. Every later stage receives
//! `&ScenarioRegistry`, and detection logic never receives it at all.

use crate::types::{EntityId, Timestamp, Typology};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub scenario_id: EntityId,
    pub typology: Typology,
    pub primary_account: EntityId,
    pub customer_id: EntityId,
    /// Every account at this bank that took part, primary first.
    pub participants: Vec<EntityId>,
    pub transaction_ids: Vec<EntityId>,
    pub start: Timestamp,
    pub end: Timestamp,
    pub total_amount: f64,
}

/// Append-only. Entries are immutable once registered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioRegistry {
    scenarios: Vec<Scenario>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scenario: Scenario) {
        log::debug!(
            "registered scenario {} ({}) on {} with {} transactions",
            scenario.scenario_id,
            scenario.typology,
            scenario.primary_account,
            scenario.transaction_ids.len()
        );
        self.scenarios.push(scenario);
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Accounts already used as a primary participant.
    pub fn primary_accounts(&self) -> BTreeSet<&str> {
        self.scenarios
            .iter()
            .map(|s| s.primary_account.as_str())
            .collect()
    }

    /// Participant account -> scenarios it appears in, in registration order.
    pub fn participant_index(&self) -> BTreeMap<&str, Vec<&Scenario>> {
        let mut index: BTreeMap<&str, Vec<&Scenario>> = BTreeMap::new();
        for scenario in &self.scenarios {
            for account in &scenario.participants {
                let entry = index.entry(account.as_str()).or_default();
                if !entry.iter().any(|s| s.scenario_id == scenario.scenario_id) {
                    entry.push(scenario);
                }
            }
        }
        index
    }

    pub fn count_by_typology(&self) -> BTreeMap<Typology, usize> {
        let mut counts = BTreeMap::new();
        for scenario in &self.scenarios {
            *counts.entry(scenario.typology).or_insert(0) += 1;
        }
        counts
    }
}
