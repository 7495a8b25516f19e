//! The transaction record and the merged ledger.
//!
//! RULE: `Transaction` holds only fields a monitoring system would see.
//! Labels live in `TxnTruth`, next to the record but never inside it.

use crate::{
    population_subsystem::Population,
    types::{Channel, Day, Direction, EntityId, Timestamp, TxnKind, Typology},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counterparty reference used for cash movements.
pub const CASH_COUNTERPARTY: &str = "CASH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub txn_id: EntityId,
    pub account_id: EntityId,
    pub customer_id: EntityId,
    pub timestamp: Timestamp,
    pub amount: f64,
    pub currency: String,
    pub direction: Direction,
    #[serde(rename = "txn_type")]
    pub kind: TxnKind,
    pub channel: Channel,
    /// CP_* for external parties, ACCT_* for accounts at this bank, CASH for cash.
    pub counterparty_id: EntityId,
    pub counterparty_account: Option<String>,
    pub origin_country: String,
    pub destination_country: String,
    pub description: String,
}

impl Transaction {
    pub fn day(&self) -> Day {
        self.timestamp.date()
    }

    pub fn is_cross_border(&self) -> bool {
        self.origin_country != self.destination_country
    }

    /// Country on the far side of the movement.
    pub fn counterparty_country(&self) -> &str {
        match self.direction {
            Direction::Credit => &self.origin_country,
            Direction::Debit => &self.destination_country,
        }
    }
}

/// Ground truth for one transaction. Baseline records are always clean.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxnTruth {
    pub txn_id: EntityId,
    pub is_suspicious: bool,
    pub typology: Option<Typology>,
    pub scenario_id: Option<EntityId>,
}

impl TxnTruth {
    pub fn clean(txn_id: &str) -> Self {
        Self {
            txn_id: txn_id.to_string(),
            is_suspicious: false,
            typology: None,
            scenario_id: None,
        }
    }

    pub fn injected(txn_id: &str, typology: Typology, scenario_id: &str) -> Self {
        Self {
            txn_id: txn_id.to_string(),
            is_suspicious: true,
            typology: Some(typology),
            scenario_id: Some(scenario_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub txn: Transaction,
    pub truth: TxnTruth,
}

impl LedgerEntry {
    pub fn baseline(txn: Transaction) -> Self {
        let truth = TxnTruth::clean(&txn.txn_id);
        Self { txn, truth }
    }
}

/// Baseline and injected transactions merged into one time-ordered stream.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Merge and sort by (timestamp, account, txn id). The tie-breakers make
    /// the order total, so the stream is identical across runs.
    pub fn merge(baseline: Vec<Transaction>, injected: Vec<LedgerEntry>) -> Self {
        let mut entries: Vec<LedgerEntry> = baseline
            .into_iter()
            .map(LedgerEntry::baseline)
            .chain(injected)
            .collect();
        entries.sort_by(|a, b| {
            a.txn
                .timestamp
                .cmp(&b.txn.timestamp)
                .then_with(|| a.txn.account_id.cmp(&b.txn.account_id))
                .then_with(|| a.txn.txn_id.cmp(&b.txn.txn_id))
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The visible stream only.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.iter().map(|e| &e.txn)
    }

    pub fn truths(&self) -> impl Iterator<Item = &TxnTruth> {
        self.entries.iter().map(|e| &e.truth)
    }

    pub fn injected_count(&self) -> usize {
        self.entries.iter().filter(|e| e.truth.is_suspicious).count()
    }

    /// Visible transactions up to and including `as_of`, grouped by account
    /// and kept in ledger order.
    pub fn visible_by_account(&self, as_of: Day) -> BTreeMap<&str, Vec<&Transaction>> {
        let mut grouped: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
        for txn in self.transactions().filter(|t| t.day() <= as_of) {
            grouped.entry(txn.account_id.as_str()).or_default().push(txn);
        }
        grouped
    }

    /// Post-generation lifecycle check. Any transaction outside its account's
    /// [open, close) window is returned as the first offender.
    pub fn first_lifecycle_violation<'a>(&'a self, population: &Population) -> Option<&'a Transaction> {
        self.transactions().find(|txn| {
            population
                .account(&txn.account_id)
                .map_or(true, |account| !account.is_active_on(txn.day()))
        })
    }
}
