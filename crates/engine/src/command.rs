/// The command surface exposed to front ends.
///
/// Inputs arrive as raw, optional strings (as typed by a user) and are
/// validated here before anything is mutated.
use std::fmt;
use std::time::Duration;

use config::CompactionStrategy;
use memtable::{Key, Record};
use tracing::info;

use crate::{Engine, EngineError, EventKind, LookupResult, RangeEntry, Result};

/// A configuration change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    MemtableCapacity(usize),
    CompactionStrategy(CompactionStrategy),
    SizeTieredThreshold(usize),
    L0CompactionThreshold(usize),
    BloomFilter(bool),
    FencePointers(bool),
    StepDelay(Duration),
}

impl Setting {
    /// Names accepted by [`Setting::parse`].
    pub const NAMES: [&'static str; 7] = [
        "memtable",
        "strategy",
        "threshold",
        "l0",
        "bloom",
        "fence",
        "delay",
    ];

    /// Parses `name value`, e.g. `("bloom", "on")` or `("delay", "250")`
    /// (milliseconds).
    pub fn parse(name: &str, value: &str) -> Result<Self> {
        let invalid = || EngineError::InvalidSettingValue {
            setting: name.to_string(),
            value: value.to_string(),
        };
        let number = || value.trim().parse::<usize>().map_err(|_| invalid());
        let flag = || match value.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "1" | "yes" => Ok(true),
            "off" | "false" | "0" | "no" => Ok(false),
            _ => Err(invalid()),
        };

        match name.trim().to_ascii_lowercase().as_str() {
            "memtable" | "memtable_capacity" | "capacity" => Ok(Setting::MemtableCapacity(number()?)),
            "strategy" | "compaction" => Ok(Setting::CompactionStrategy(
                value.parse().map_err(|_| invalid())?,
            )),
            "threshold" | "size_tiered_threshold" => Ok(Setting::SizeTieredThreshold(number()?)),
            "l0" | "l0_threshold" => Ok(Setting::L0CompactionThreshold(number()?)),
            "bloom" => Ok(Setting::BloomFilter(flag()?)),
            "fence" => Ok(Setting::FencePointers(flag()?)),
            "delay" | "step_delay" => {
                let ms = value.trim().parse::<u64>().map_err(|_| invalid())?;
                Ok(Setting::StepDelay(Duration::from_millis(ms)))
            }
            other => Err(EngineError::UnknownSetting(other.to_string())),
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::MemtableCapacity(n) => write!(f, "memtable capacity = {}", n),
            Setting::CompactionStrategy(s) => write!(f, "compaction strategy = {}", s),
            Setting::SizeTieredThreshold(n) => write!(f, "size-tiered threshold = {}", n),
            Setting::L0CompactionThreshold(n) => write!(f, "L0 compaction threshold = {}", n),
            Setting::BloomFilter(on) => write!(f, "bloom filters = {}", on),
            Setting::FencePointers(on) => write!(f, "fence pointers = {}", on),
            Setting::StepDelay(d) => write!(f, "step delay = {}ms", d.as_millis()),
        }
    }
}

/// A client request with raw user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Missing key or value is generated at random.
    Put {
        key: Option<String>,
        value: Option<String>,
    },
    Delete {
        key: Option<String>,
    },
    Get {
        key: Option<String>,
    },
    Range {
        start: Option<String>,
        end: Option<String>,
    },
    Reset,
    Configure(Setting),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Written(Record),
    Deleted(Record),
    Lookup(LookupResult),
    Range(Vec<RangeEntry>),
    Reset,
    Configured(Setting),
}

impl Engine {
    /// Validates and runs `command`.
    ///
    /// # Errors
    ///
    /// Missing or malformed input fails before any state changes.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome> {
        match command {
            Command::Put { key, value } => {
                let key = key
                    .filter(|k| !k.trim().is_empty())
                    .map(|k| self.parse_key(&k))
                    .transpose()?;
                let record = match (key, value) {
                    (Some(k), Some(v)) => self.put(k, v).await?,
                    (key, None) => self.put_random(key).await?,
                    (None, Some(v)) => {
                        let key = self.random_key();
                        self.put(key, v).await?
                    }
                };
                Ok(CommandOutcome::Written(record))
            }
            Command::Delete { key } => {
                let key = self.required_key(key)?;
                Ok(CommandOutcome::Deleted(self.delete(key).await?))
            }
            Command::Get { key } => {
                let key = self.required_key(key)?;
                Ok(CommandOutcome::Lookup(self.get(key).await?))
            }
            Command::Range { start, end } => {
                let present = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
                let (Some(start), Some(end)) = (present(start), present(end)) else {
                    return Err(EngineError::MissingRangeBound);
                };
                let start = self.parse_key(&start)?;
                let end = self.parse_key(&end)?;
                Ok(CommandOutcome::Range(self.range_get(start, end).await?))
            }
            Command::Reset => {
                self.reset();
                Ok(CommandOutcome::Reset)
            }
            Command::Configure(setting) => {
                self.configure(setting).await?;
                Ok(CommandOutcome::Configured(setting))
            }
        }
    }

    /// Applies a configuration change and re-runs the flush/compaction
    /// checks under the new settings.
    ///
    /// # Errors
    ///
    /// Out-of-range values fail validation. Switching compaction strategy
    /// while the store holds any data fails with
    /// [`EngineError::StrategySwitchRequiresReset`]; call [`Engine::reset`]
    /// first.
    pub async fn configure(&self, setting: Setting) -> Result<()> {
        let mut st = self.inner.state.lock();
        let mut next = st.config.clone();
        match setting {
            Setting::MemtableCapacity(n) => next.memtable_capacity = n,
            Setting::CompactionStrategy(s) => next.compaction_strategy = s,
            Setting::SizeTieredThreshold(n) => next.size_tiered_threshold = n,
            Setting::L0CompactionThreshold(n) => next.l0_compaction_threshold = n,
            Setting::BloomFilter(on) => next.bloom_filter_enabled = on,
            Setting::FencePointers(on) => next.fence_pointers_enabled = on,
            Setting::StepDelay(d) => next.step_delay = d,
        }
        next.validate()?;

        if next.compaction_strategy != st.config.compaction_strategy {
            if st.holds_data() || st.flushing || st.compacting {
                return Err(EngineError::StrategySwitchRequiresReset {
                    requested: next.compaction_strategy,
                });
            }
            st.tables = crate::TableStore::new(next.compaction_strategy, next.num_levels);
        }

        info!(%setting, "configuration changed");
        st.config = next;
        st.events.push(EventKind::System, format!("Set {}", setting));
        self.schedule_maintenance(&mut st);
        Ok(())
    }

    /// Parses user input as a key of this store's kind.
    pub fn parse_key(&self, input: &str) -> Result<Key> {
        let kind = self.inner.state.lock().config.key_kind;
        Ok(Key::parse(input, kind)?)
    }

    fn required_key(&self, input: Option<String>) -> Result<Key> {
        match input {
            Some(k) if !k.trim().is_empty() => self.parse_key(&k),
            _ => Err(EngineError::MissingKey),
        }
    }

    fn random_key(&self) -> Key {
        let mut st = self.inner.state.lock();
        crate::write::random_key(&mut st)
    }
}
