//! # Bloom Filter (simulated)
//!
//! A probabilistic stand-in for a per-table bloom filter.
//!
//! A real filter never reports a present key as absent and occasionally
//! reports an absent key as present. This model reproduces exactly that
//! observable behaviour without a bit array: the caller already knows whether
//! the key is in the table, and the filter only decides, with probability
//! `false_positive_rate`, whether an absent key slips through as "maybe
//! present".
//!
//! ## Usage in StrataKV
//!
//! During point lookups the engine probes the filter of every size-tiered
//! table and every L0 file before scanning it. An [`BloomProbe::Absent`]
//! answer skips the table; a [`BloomProbe::FalsePositive`] costs a wasted scan
//! and is counted.
//!
//! ## Example
//!
//! ```rust
//! use bloom::{BloomProbe, SimulatedBloomFilter};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let bf = SimulatedBloomFilter::new(0.0);
//! let mut rng = StdRng::seed_from_u64(7);
//! assert_eq!(bf.probe(true, &mut rng), BloomProbe::Present);
//! assert_eq!(bf.probe(false, &mut rng), BloomProbe::Absent);
//! ```

use rand::Rng;

/// False-positive probability used when none is configured.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.1;

/// Outcome of consulting a filter for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomProbe {
    /// The key is in the table; filters have no false negatives.
    Present,
    /// The key is absent but the filter said "maybe present".
    FalsePositive,
    /// The filter proved the key absent; the table can be skipped.
    Absent,
}

impl BloomProbe {
    /// Whether the table has to be scanned after this answer.
    #[must_use]
    pub fn should_search(self) -> bool {
        !matches!(self, BloomProbe::Absent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedBloomFilter {
    false_positive_rate: f64,
}

impl SimulatedBloomFilter {
    /// # Panics
    ///
    /// Panics if `false_positive_rate` is not in `[0, 1]`.
    pub fn new(false_positive_rate: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&false_positive_rate),
            "false_positive_rate must be in [0, 1]"
        );
        Self {
            false_positive_rate,
        }
    }

    #[must_use]
    pub fn false_positive_rate(&self) -> f64 {
        self.false_positive_rate
    }

    /// Answers a membership query for a key whose real membership is
    /// `actually_present`.
    pub fn probe<R: Rng + ?Sized>(&self, actually_present: bool, rng: &mut R) -> BloomProbe {
        if actually_present {
            BloomProbe::Present
        } else if rng.gen_bool(self.false_positive_rate) {
            BloomProbe::FalsePositive
        } else {
            BloomProbe::Absent
        }
    }
}

impl Default for SimulatedBloomFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FALSE_POSITIVE_RATE)
    }
}
