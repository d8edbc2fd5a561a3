//! Type-safe identifiers for services and sources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::errors::{HashpassError, Result};

/// A validated service name.
///
/// Service names are hashed verbatim into the entropy stream, so they are
/// never normalised. They must be non-empty and free of control characters,
/// and no `/`-separated part may be `.` or `..`, since a URL path would
/// collapse those.
///
/// # Example
///
/// ```
/// use hashpass_types::ServiceName;
///
/// let svc = ServiceName::new("google").unwrap();
/// assert_eq!(svc.as_str(), "google");
///
/// assert!(ServiceName::new("").is_err());
/// assert!(ServiceName::new("tab\there").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

impl ServiceName {
    /// Create a new validated service name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, contains control characters,
    /// or has a `.`/`..` path part.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        if !Self::is_valid(name) {
            return Err(HashpassError::Validation(format!(
                "Invalid service name '{}': must be non-empty, contain no control characters, \
                and have no '.' or '..' path part",
                name.escape_debug()
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Check if a name is valid without allocating.
    pub fn is_valid(name: &str) -> bool {
        !name.is_empty()
            && !name.chars().any(char::is_control)
            && !name.split('/').any(|part| part == "." || part == "..")
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes hashed into the entropy stream.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ServiceName {
    type Err = HashpassError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ServiceName {
    type Error = HashpassError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ServiceName> for String {
    fn from(name: ServiceName) -> Self {
        name.0
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated settings source name (e.g. `local`, `work-laptop`).
///
/// Source names must:
/// - Start with a lowercase letter or digit
/// - Contain only lowercase letters, digits, hyphens, and underscores
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceName(String);

impl SourceName {
    /// Create a new validated source name.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        if !Self::is_valid(name) {
            return Err(HashpassError::Validation(format!(
                "Invalid source name '{}': must contain only lowercase letters, digits, hyphens, \
                and underscores, and must start with a letter or digit",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// The conventional name of the local store source.
    pub fn local() -> Self {
        Self("local".to_string())
    }

    /// Check if a name is valid without allocating.
    pub fn is_valid(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_lowercase() || first.is_ascii_digit() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceName {
    type Err = HashpassError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for SourceName {
    type Error = HashpassError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<SourceName> for String {
    fn from(name: SourceName) -> Self {
        name.0
    }
}
