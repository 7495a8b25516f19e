//! Transaction-network metrics for the signal stage.
//!
//! The graph is built from the visible ledger only: nodes are accounts and
//! external counterparties, edges are observed transactions. Cash is not a
//! node.

use crate::{
    config::RegionConfig,
    population_subsystem::Population,
    transaction::{Ledger, CASH_COUNTERPARTY},
    types::{Day, Direction},
};
use std::collections::{BTreeMap, VecDeque};

/// Distance reported when no flagged entity is reachable.
pub const UNREACHABLE: u32 = 99;

/// Country risk at or above this marks a node as risky for flow metrics.
const RISKY_COUNTRY: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkMetrics {
    pub degree: f64,
    pub risk_flow_in: f64,
    pub risk_flow_out: f64,
    pub pep_distance: u32,
    pub sanctions_distance: u32,
}

impl Default for NetworkMetrics {
    fn default() -> Self {
        Self {
            degree: 0.0,
            risk_flow_in: 0.0,
            risk_flow_out: 0.0,
            pep_distance: UNREACHABLE,
            sanctions_distance: UNREACHABLE,
        }
    }
}

/// Read-only lookup the signal stage consults. Absent data yields
/// `NetworkMetrics::default()`.
pub trait GraphProvider: Send + Sync {
    fn metrics(&self, account_id: &str, as_of: Day) -> NetworkMetrics;
}

/// Provider with no graph behind it.
pub struct NeutralGraph;

impl GraphProvider for NeutralGraph {
    fn metrics(&self, _account_id: &str, _as_of: Day) -> NetworkMetrics {
        NetworkMetrics::default()
    }
}

#[derive(Debug, Clone, Copy)]
struct NodeFlags {
    pep: bool,
    sanctioned: bool,
    risky: bool,
}

/// Graph over the ledger as of one observation date.
pub struct LedgerGraph {
    as_of: Day,
    ids: BTreeMap<String, usize>,
    neighbours: Vec<Vec<usize>>,
    flow_in: Vec<f64>,
    flow_out: Vec<f64>,
    pep_distance: Vec<u32>,
    sanctions_distance: Vec<u32>,
}

impl LedgerGraph {
    pub fn build(ledger: &Ledger, population: &Population, regions: &RegionConfig, as_of: Day) -> Self {
        let mut ids: BTreeMap<String, usize> = BTreeMap::new();
        let mut flags: Vec<NodeFlags> = Vec::new();

        for account in &population.accounts {
            let customer = population.customer(&account.customer_id);
            let pep = customer.map_or(false, |c| c.is_pep);
            let sanctioned = customer.map_or(false, |c| c.is_sanctioned);
            ids.insert(account.account_id.clone(), flags.len());
            flags.push(NodeFlags {
                pep,
                sanctioned,
                risky: pep || sanctioned || regions.country_risk(&account.country) >= RISKY_COUNTRY,
            });
        }
        for cp in &population.counterparties {
            ids.insert(cp.counterparty_id.clone(), flags.len());
            flags.push(NodeFlags {
                pep: cp.is_pep,
                sanctioned: cp.is_sanctioned,
                risky: cp.is_pep || cp.is_sanctioned || regions.country_risk(&cp.country) >= RISKY_COUNTRY,
            });
        }

        let n = flags.len();
        let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut flow_in = vec![0.0; n];
        let mut flow_out = vec![0.0; n];
        for txn in ledger.transactions().filter(|t| t.day() <= as_of) {
            if txn.counterparty_id == CASH_COUNTERPARTY {
                continue;
            }
            let (Some(&a), Some(&b)) = (ids.get(&txn.account_id), ids.get(&txn.counterparty_id)) else {
                continue;
            };
            if a == b {
                continue;
            }
            neighbours[a].push(b);
            neighbours[b].push(a);
            if flags[b].risky {
                match txn.direction {
                    Direction::Credit => flow_in[a] += txn.amount,
                    Direction::Debit => flow_out[a] += txn.amount,
                }
            }
        }
        for list in &mut neighbours {
            list.sort_unstable();
            list.dedup();
        }

        let pep_sources: Vec<usize> = (0..n).filter(|i| flags[*i].pep).collect();
        let sanction_sources: Vec<usize> = (0..n).filter(|i| flags[*i].sanctioned).collect();
        let pep_distance = multi_source_bfs(&neighbours, &pep_sources);
        let sanctions_distance = multi_source_bfs(&neighbours, &sanction_sources);

        Self {
            as_of,
            ids,
            neighbours,
            flow_in,
            flow_out,
            pep_distance,
            sanctions_distance,
        }
    }

    pub fn node_count(&self) -> usize {
        self.neighbours.len()
    }
}

impl GraphProvider for LedgerGraph {
    fn metrics(&self, account_id: &str, as_of: Day) -> NetworkMetrics {
        if as_of != self.as_of {
            return NetworkMetrics::default();
        }
        let Some(&node) = self.ids.get(account_id) else {
            return NetworkMetrics::default();
        };
        NetworkMetrics {
            degree: self.neighbours[node].len() as f64,
            risk_flow_in: self.flow_in[node],
            risk_flow_out: self.flow_out[node],
            pep_distance: self.pep_distance[node],
            sanctions_distance: self.sanctions_distance[node],
        }
    }
}

/// Hop distance from every node to its nearest source, capped at `UNREACHABLE`.
fn multi_source_bfs(neighbours: &[Vec<usize>], sources: &[usize]) -> Vec<u32> {
    let mut distance = vec![UNREACHABLE; neighbours.len()];
    let mut queue = VecDeque::new();
    for &src in sources {
        if distance[src] != 0 {
            distance[src] = 0;
            queue.push_back(src);
        }
    }
    while let Some(node) = queue.pop_front() {
        let next = distance[node] + 1;
        if next >= UNREACHABLE {
            continue;
        }
        for &n in &neighbours[node] {
            if distance[n] == UNREACHABLE {
                distance[n] = next;
                queue.push_back(n);
            }
        }
    }
    distance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bfs_reports_hops_and_unreachable() {
        // 0 - 1 - 2    3
        let graph = vec![vec![1], vec![0, 2], vec![1], vec![]];
        assert_eq!(multi_source_bfs(&graph, &[0]), vec![0, 1, 2, UNREACHABLE]);
        assert_eq!(multi_source_bfs(&graph, &[]), vec![UNREACHABLE; 4]);
        assert_eq!(multi_source_bfs(&graph, &[0, 2]), vec![0, 1, 0, UNREACHABLE]);
    }
}
