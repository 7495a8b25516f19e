//! Deterministic random number generation.
//!
//! RULE: Nothing in the generator may call any platform RNG.
//! All randomness flows through SubsystemRng instances derived
//! from the single master seed recorded on the run.
//!
//! Streams are keyed by (stage slot, entity key, purpose) rather than
//! handed out in call order. This means:
//!   - Work for one account never shifts the stream of another account.
//!   - Parallel stages produce the same output at any degree of parallelism.
//!   - Adding a new stage never changes existing stages' streams.

use rand::{RngCore, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};
use rand_pcg::Pcg64Mcg;
use uuid::Uuid;

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// A named, deterministic RNG for a single (stage, entity, purpose) stream.
pub struct SubsystemRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SubsystemRng {
    /// Create an RNG directly from a fully derived seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n). Returns 0 when n is 0.
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        self.inner.next_u64() % n
    }

    /// Roll an index into a slice of length `len`.
    pub fn index(&mut self, len: usize) -> usize {
        self.next_u64_below(len as u64) as usize
    }

    /// Roll an integer in the inclusive range [lo, hi].
    pub fn range_inclusive(&mut self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        lo + self.next_u64_below(hi - lo + 1)
    }

    /// Roll a float in [lo, hi).
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        lo + (hi - lo) * self.next_f64()
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Normal draw. A non-finite or negative deviation yields the mean.
    pub fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        match Normal::new(mean, std_dev) {
            Ok(normal) => normal.sample(&mut self.inner),
            Err(_) => mean,
        }
    }

    /// Right-skewed positive draw with the given arithmetic mean.
    pub fn log_normal(&mut self, mean: f64, sigma: f64) -> f64 {
        if mean <= 0.0 {
            return 0.0;
        }
        let mu = mean.ln() - sigma * sigma / 2.0;
        match LogNormal::new(mu, sigma) {
            Ok(dist) => dist.sample(&mut self.inner),
            Err(_) => mean,
        }
    }

    /// Cumulative-roll pick over (item, weight) pairs.
    /// Zero or negative weights are never chosen; an all-zero table returns None.
    pub fn pick_weighted<'a, T>(&mut self, items: &'a [(T, f64)]) -> Option<&'a T> {
        let total: f64 = items.iter().map(|(_, w)| w.max(0.0)).sum();
        if total <= 0.0 {
            return None;
        }
        let roll = self.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last = None;
        for (item, weight) in items {
            if *weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            last = Some(item);
            if roll < cumulative {
                return Some(item);
            }
        }
        last
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            Some(&items[self.index(items.len())])
        }
    }

    /// Choose `k` distinct indices out of `n` (partial Fisher-Yates).
    /// Returns fewer than `k` when `n < k`.
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..n).collect();
        let take = k.min(n);
        for i in 0..take {
            let j = i + self.index(n - i);
            pool.swap(i, j);
        }
        pool.truncate(take);
        pool
    }

    /// Deterministic v4-shaped UUID drawn from this stream.
    pub fn uuid(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.inner.next_u64().to_le_bytes());
        bytes[8..].copy_from_slice(&self.inner.next_u64().to_le_bytes());
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

/// Factory for every keyed stream of a single run.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Stream for one (stage, entity, purpose) tuple.
    pub fn stream(&self, slot: StageSlot, entity: &str, purpose: &str) -> SubsystemRng {
        let stage_seed = splitmix64(self.master_seed ^ (slot as u64).wrapping_mul(GOLDEN_GAMMA));
        let entity_seed = splitmix64(stage_seed ^ stable_hash(entity));
        let seed = splitmix64(entity_seed ^ stable_hash(purpose).rotate_left(17));
        SubsystemRng::from_seed(seed).with_name(slot.name())
    }
}

/// FNV-1a over the bytes of `key`. Stable across platforms and releases,
/// unlike std's hasher.
pub fn stable_hash(key: &str) -> u64 {
    key.bytes().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
        (acc ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Stable stage slot assignments.
/// Entries are append-only. Never reorder or remove one.
/// Reordering changes every stage's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StageSlot {
    Population = 0,
    Baseline = 1,
    Typology = 2,
    News = 3,
    Signal = 4,
    Alert = 5,
    Calibration = 6,
    Case = 7,
    // New stages go at the end.
}

impl StageSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Population => "population",
            Self::Baseline => "baseline",
            Self::Typology => "typology",
            Self::News => "news",
            Self::Signal => "signal",
            Self::Alert => "alert",
            Self::Calibration => "calibration",
            Self::Case => "case",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_stream() {
        let bank = RngBank::new(7);
        let mut a = bank.stream(StageSlot::Baseline, "ACCT_00000001", "2024-01-01");
        let mut b = bank.stream(StageSlot::Baseline, "ACCT_00000001", "2024-01-01");
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn keys_are_independent() {
        let bank = RngBank::new(7);
        let mut a = bank.stream(StageSlot::Baseline, "ACCT_00000001", "2024-01-01");
        let mut b = bank.stream(StageSlot::Baseline, "ACCT_00000002", "2024-01-01");
        let mut c = bank.stream(StageSlot::Signal, "ACCT_00000001", "2024-01-01");
        let first = a.next_u64();
        assert_ne!(first, b.next_u64());
        assert_ne!(first, c.next_u64());
    }

    #[test]
    fn sample_indices_are_distinct_and_capped() {
        let mut rng = SubsystemRng::from_seed(3);
        let picked = rng.sample_indices(10, 4);
        assert_eq!(picked.len(), 4);
        let mut sorted = picked.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 4, "indices repeated: {picked:?}");
        assert_eq!(rng.sample_indices(3, 8).len(), 3);
    }

    #[test]
    fn weighted_pick_skips_zero_weights() {
        let mut rng = SubsystemRng::from_seed(11);
        let table = [("never", 0.0), ("always", 1.0)];
        for _ in 0..100 {
            assert_eq!(rng.pick_weighted(&table), Some(&"always"));
        }
        let empty: [(&str, f64); 1] = [("none", 0.0)];
        assert_eq!(rng.pick_weighted(&empty), None);
    }
}
