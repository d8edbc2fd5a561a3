//! Common enumerations used throughout hashpass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::errors::{HashpassError, Result};

/// Log level enumeration for the logging system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No logging
    None,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Detailed trace messages
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::None => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = HashpassError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "NONE" => Ok(LogLevel::None),
            "ERROR" => Ok(LogLevel::Error),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            _ => Err(HashpassError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::None => write!(f, "NONE"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Trace => write!(f, "TRACE"),
        }
    }
}

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHA: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBER: &str = "0123456789";
const SPACE: &str = " ";
const DASH: &str = "-_";
const SYMBOL: &str = "!\"#$%&'()*+,./:;<=>?@[\\]^{|}~-_";

/// The canonical character union, in the fixed order the generator indexes into.
///
/// Changing this string changes every previously generated secret.
pub const CANONICAL_CHARS: &str = concat!(
    "abcdefghijklmnopqrstuvwxyz",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "0123456789",
    " ",
    "!\"#$%&'()*+,./:;<=>?@[\\]^{|}~-_",
);

/// Character classes a policy can exclude or set minimums for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
    /// `a`-`z`
    Lower,
    /// `A`-`Z`
    Upper,
    /// `0`-`9`
    Number,
    /// The space character
    Space,
    /// `-` and `_`
    Dash,
    /// Punctuation, including both dash characters
    Symbol,
    /// Lower and upper combined
    Alpha,
}

impl CharClass {
    /// Every class, in settings-field order.
    pub const ALL: [CharClass; 7] = [
        CharClass::Lower,
        CharClass::Upper,
        CharClass::Number,
        CharClass::Space,
        CharClass::Dash,
        CharClass::Symbol,
        CharClass::Alpha,
    ];

    /// The ordered characters belonging to this class.
    pub fn chars(&self) -> &'static str {
        match self {
            CharClass::Lower => LOWER,
            CharClass::Upper => UPPER,
            CharClass::Number => NUMBER,
            CharClass::Space => SPACE,
            CharClass::Dash => DASH,
            CharClass::Symbol => SYMBOL,
            CharClass::Alpha => ALPHA,
        }
    }

    /// Whether `c` belongs to this class.
    pub fn contains(&self, c: char) -> bool {
        self.chars().contains(c)
    }

    /// Settings field name for this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            CharClass::Lower => "lower",
            CharClass::Upper => "upper",
            CharClass::Number => "number",
            CharClass::Space => "space",
            CharClass::Dash => "dash",
            CharClass::Symbol => "symbol",
            CharClass::Alpha => "alpha",
        }
    }
}

impl FromStr for CharClass {
    type Err = HashpassError;

    fn from_str(s: &str) -> Result<Self> {
        CharClass::ALL
            .iter()
            .copied()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| HashpassError::Validation(format!("Unknown character class: {}", s)))
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of storage backing a settings source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Encrypted store file on the local disk
    Local,
    /// Remote HTTP key/value storage account
    Remote,
    /// In-process map (tests and ephemeral sessions)
    Memory,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Remote => write!(f, "remote"),
            SourceKind::Memory => write!(f, "memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_is_concatenation_of_classes() {
        let joined: String = [
            CharClass::Lower,
            CharClass::Upper,
            CharClass::Number,
            CharClass::Space,
            CharClass::Symbol,
        ]
        .iter()
        .map(|c| c.chars())
        .collect();
        assert_eq!(joined, CANONICAL_CHARS);
        assert_eq!(CANONICAL_CHARS.chars().count(), 94);
    }

    #[test]
    fn test_symbol_contains_dashes() {
        for c in CharClass::Dash.chars().chars() {
            assert!(CharClass::Symbol.contains(c));
        }
        assert!(!CharClass::Symbol.contains('`'));
    }

    #[test]
    fn test_char_class_round_trips_names() {
        for class in CharClass::ALL {
            assert_eq!(class.as_str().parse::<CharClass>().unwrap(), class);
        }
        assert!("emoji".parse::<CharClass>().is_err());
    }

    #[test]
    fn test_log_level_directive() {
        assert_eq!("warning".parse::<LogLevel>().unwrap().as_directive(), "warn");
        assert_eq!(LogLevel::None.as_directive(), "off");
    }
}
