use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The declared key type of a store instance.
///
/// A store holds keys of exactly one kind. Mixing kinds is a configuration
/// error caught at the engine boundary, never coerced at comparison time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Signed integers, compared numerically.
    Integer,
    /// UTF-8 strings, compared lexicographically.
    String,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Integer => f.write_str("integer"),
            KeyKind::String => f.write_str("string"),
        }
    }
}

impl FromStr for KeyKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "number" => Ok(KeyKind::Integer),
            "str" | "string" => Ok(KeyKind::String),
            other => Err(KeyError::UnknownKind(other.to_string())),
        }
    }
}

/// Errors produced while turning user input into a [`Key`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key must not be empty")]
    Empty,

    #[error("`{0}` is not a valid integer key")]
    InvalidInteger(String),

    #[error("unknown key kind `{0}` (expected `integer` or `string`)")]
    UnknownKind(String),
}

/// A record key.
///
/// Ordering within one kind is the natural one: numeric for `Int`,
/// lexicographic for `Str`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        match self {
            Key::Int(_) => KeyKind::Integer,
            Key::Str(_) => KeyKind::String,
        }
    }

    /// Parses raw user input as a key of the given kind.
    pub fn parse(input: &str, kind: KeyKind) -> Result<Key, KeyError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(KeyError::Empty);
        }
        match kind {
            KeyKind::Integer => input
                .parse::<i64>()
                .map(Key::Int)
                .map_err(|_| KeyError::InvalidInteger(input.to_string())),
            KeyKind::String => Ok(Key::Str(input.to_string())),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}
