//! Configuration for the StrataKV engine
//!
//! Centralized, validated settings with defaults, a builder, and an
//! environment loader (`STRATA_*` variables).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use memtable::{KeyError, KeyKind};
use thiserror::Error;

pub const ENV_MEMTABLE_CAPACITY: &str = "STRATA_MEMTABLE_CAPACITY";
pub const ENV_STRATEGY: &str = "STRATA_STRATEGY";
pub const ENV_SIZE_TIERED_THRESHOLD: &str = "STRATA_SIZE_TIERED_THRESHOLD";
pub const ENV_L0_THRESHOLD: &str = "STRATA_L0_THRESHOLD";
pub const ENV_BLOOM: &str = "STRATA_BLOOM";
pub const ENV_FENCE: &str = "STRATA_FENCE";
pub const ENV_STEP_DELAY_MS: &str = "STRATA_STEP_DELAY_MS";
pub const ENV_KEY_KIND: &str = "STRATA_KEY_KIND";
pub const ENV_SEED: &str = "STRATA_SEED";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("memtable capacity must be at least 1 (got {0})")]
    MemtableCapacity(usize),

    #[error("size-tiered threshold must be at least 2 (got {0})")]
    SizeTieredThreshold(usize),

    #[error("L0 compaction threshold must be at least 2 (got {0})")]
    L0Threshold(usize),

    #[error("number of levels must be at least 2 (got {0})")]
    NumLevels(usize),

    #[error("bloom false-positive rate must be in [0, 1] (got {0})")]
    FalsePositiveRate(f64),

    #[error("fence block size must be at least 1 (got {0})")]
    FenceBlockSize(usize),

    #[error("event log capacity must be at least 1 (got {0})")]
    EventLogCapacity(usize),

    #[error("unknown compaction strategy `{0}` (expected size-tiered or leveled)")]
    UnknownStrategy(String),

    #[error("invalid value `{value}` for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error(transparent)]
    KeyKind(#[from] KeyError),
}

/// Which compaction algorithm the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactionStrategy {
    /// Flat table list; similar-sized tables are merged in groups.
    #[default]
    SizeTiered,
    /// L0 plus non-overlapping levels, each ten times larger than the last.
    Leveled,
}

impl fmt::Display for CompactionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompactionStrategy::SizeTiered => f.write_str("size-tiered"),
            CompactionStrategy::Leveled => f.write_str("leveled"),
        }
    }
}

impl FromStr for CompactionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "size-tiered" | "sizetiered" | "tiered" | "stcs" => Ok(CompactionStrategy::SizeTiered),
            "leveled" | "levelled" | "lcs" => Ok(CompactionStrategy::Leveled),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Main configuration for an engine instance
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    // -------------------------------------------------------------------------
    // Write path
    // -------------------------------------------------------------------------
    /// Records the memtable holds before it is frozen and flushed.
    pub memtable_capacity: usize,

    /// Key type every operation on this instance must use.
    pub key_kind: KeyKind,

    // -------------------------------------------------------------------------
    // Compaction
    // -------------------------------------------------------------------------
    pub compaction_strategy: CompactionStrategy,

    /// Similar-sized tables needed to trigger a size-tiered merge.
    pub size_tiered_threshold: usize,

    /// L0 files needed to trigger a leveled compaction.
    pub l0_compaction_threshold: usize,

    /// Level count including L0. The deepest level is unbounded.
    pub num_levels: usize,

    // -------------------------------------------------------------------------
    // Read path
    // -------------------------------------------------------------------------
    pub bloom_filter_enabled: bool,
    pub bloom_false_positive_rate: f64,
    pub fence_pointers_enabled: bool,
    /// Records per fence-pointer block.
    pub fence_block_size: usize,

    // -------------------------------------------------------------------------
    // Simulation
    // -------------------------------------------------------------------------
    /// Base latency of one modeled I/O step.
    pub step_delay: Duration,

    /// Most recent events kept in the operation log.
    pub event_log_capacity: usize,

    /// Seed for random puts and bloom false positives; entropy when unset.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memtable_capacity: 5,
            key_kind: KeyKind::Integer,
            compaction_strategy: CompactionStrategy::SizeTiered,
            size_tiered_threshold: 3,
            l0_compaction_threshold: 4,
            num_levels: 4,
            bloom_filter_enabled: false,
            bloom_false_positive_rate: 0.1,
            fence_pointers_enabled: false,
            fence_block_size: 2,
            step_delay: Duration::from_millis(500),
            event_log_capacity: 15,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Create a new config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Checks every bounded setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memtable_capacity < 1 {
            return Err(ConfigError::MemtableCapacity(self.memtable_capacity));
        }
        if self.size_tiered_threshold < 2 {
            return Err(ConfigError::SizeTieredThreshold(self.size_tiered_threshold));
        }
        if self.l0_compaction_threshold < 2 {
            return Err(ConfigError::L0Threshold(self.l0_compaction_threshold));
        }
        if self.num_levels < 2 {
            return Err(ConfigError::NumLevels(self.num_levels));
        }
        if !(0.0..=1.0).contains(&self.bloom_false_positive_rate) {
            return Err(ConfigError::FalsePositiveRate(
                self.bloom_false_positive_rate,
            ));
        }
        if self.fence_block_size < 1 {
            return Err(ConfigError::FenceBlockSize(self.fence_block_size));
        }
        if self.event_log_capacity < 1 {
            return Err(ConfigError::EventLogCapacity(self.event_log_capacity));
        }
        Ok(())
    }

    /// Defaults overridden by any `STRATA_*` variables set in the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`EngineConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = parse_var(&lookup, ENV_MEMTABLE_CAPACITY)? {
            cfg.memtable_capacity = v;
        }
        if let Some(v) = lookup(ENV_STRATEGY) {
            cfg.compaction_strategy = v.parse()?;
        }
        if let Some(v) = parse_var(&lookup, ENV_SIZE_TIERED_THRESHOLD)? {
            cfg.size_tiered_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_L0_THRESHOLD)? {
            cfg.l0_compaction_threshold = v;
        }
        if let Some(v) = bool_var(&lookup, ENV_BLOOM)? {
            cfg.bloom_filter_enabled = v;
        }
        if let Some(v) = bool_var(&lookup, ENV_FENCE)? {
            cfg.fence_pointers_enabled = v;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_STEP_DELAY_MS)? {
            cfg.step_delay = Duration::from_millis(ms);
        }
        if let Some(v) = lookup(ENV_KEY_KIND) {
            cfg.key_kind = v.parse()?;
        }
        if let Some(seed) = parse_var(&lookup, ENV_SEED)? {
            cfg.rng_seed = Some(seed);
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => {
            let parsed = raw.trim().parse();
            parsed
                .map(Some)
                .map_err(|_| ConfigError::InvalidEnv { name, value: raw })
        }
    }
}

fn bool_var<F>(lookup: &F, name: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Ok(Some(true)),
            "0" | "false" | "off" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv { name, value: raw }),
        },
    }
}

/// Builder for EngineConfig
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn memtable_capacity(mut self, n: usize) -> Self {
        self.config.memtable_capacity = n;
        self
    }

    pub fn key_kind(mut self, kind: KeyKind) -> Self {
        self.config.key_kind = kind;
        self
    }

    pub fn compaction_strategy(mut self, strategy: CompactionStrategy) -> Self {
        self.config.compaction_strategy = strategy;
        self
    }

    pub fn size_tiered_threshold(mut self, n: usize) -> Self {
        self.config.size_tiered_threshold = n;
        self
    }

    pub fn l0_compaction_threshold(mut self, n: usize) -> Self {
        self.config.l0_compaction_threshold = n;
        self
    }

    pub fn num_levels(mut self, n: usize) -> Self {
        self.config.num_levels = n;
        self
    }

    pub fn bloom_filter_enabled(mut self, on: bool) -> Self {
        self.config.bloom_filter_enabled = on;
        self
    }

    pub fn bloom_false_positive_rate(mut self, rate: f64) -> Self {
        self.config.bloom_false_positive_rate = rate;
        self
    }

    pub fn fence_pointers_enabled(mut self, on: bool) -> Self {
        self.config.fence_pointers_enabled = on;
        self
    }

    pub fn fence_block_size(mut self, n: usize) -> Self {
        self.config.fence_block_size = n;
        self
    }

    /// Set the base simulated step delay
    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.config.step_delay = delay;
        self
    }

    pub fn event_log_capacity(mut self, n: usize) -> Self {
        self.config.event_log_capacity = n;
        self
    }

    /// Fix the RNG seed for reproducible runs
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
