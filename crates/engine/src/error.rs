//! Error types for the engine
//!
//! Only user-input and configuration problems are surfaced. Invariant
//! violations (a second concurrent flush, say) are prevented by in-flight
//! flags and never reach the caller.

use config::{CompactionStrategy, ConfigError};
use memtable::{KeyError, KeyKind};
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    // -------------------------------------------------------------------------
    // Input validation
    // -------------------------------------------------------------------------
    #[error("a key is required")]
    MissingKey,

    #[error("both range bounds are required")]
    MissingRangeBound,

    #[error("key `{key}` is {found} but this store uses {expected} keys")]
    KeyTypeMismatch {
        key: String,
        expected: KeyKind,
        found: KeyKind,
    },

    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot switch to {requested} compaction while the store holds data; reset first")]
    StrategySwitchRequiresReset { requested: CompactionStrategy },

    #[error("unknown setting `{0}`")]
    UnknownSetting(String),

    #[error("invalid value `{value}` for setting {setting}")]
    InvalidSettingValue { setting: String, value: String },
}
