//! Error types for hashpass operations.

use thiserror::Error;

/// The main error type for hashpass operations.
///
/// Every failure path in the generator, cipher, resolver, and migrator
/// surfaces as one of these variants. Recovery is left to the caller.
#[derive(Error, Debug)]
pub enum HashpassError {
    /// Configuration-related error (empty alphabet, non-positive length, bad config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The 256-bit entropy stream ran out before the requested length was reached
    #[error("Entropy exhausted: produced {produced} of {requested} characters from a {alphabet}-character alphabet")]
    EntropyExhausted {
        /// Requested secret length
        requested: usize,
        /// Characters produced before the stream ran out
        produced: usize,
        /// Size of the alphabet in use
        alphabet: usize,
    },

    /// Authenticated decryption failed.
    ///
    /// Tampering and corruption deliberately produce the same message.
    #[error("Decryption error: {0}")]
    Decrypt(String),

    /// A settings source failed during a query
    #[error("Source '{source_name}' failed: {message}")]
    SourceQuery {
        /// Name of the failing source
        source_name: String,
        /// Underlying failure
        message: String,
    },

    /// No legacy reader could recover the old store
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A migrated record did not read back identically
    #[error("Verification failed: {0}\n\nThe original store has not been modified.")]
    Verification(String),

    /// Storage backend error
    #[error("Store error: {0}")]
    Store(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal bug - should never happen in production
    #[error("Bug detected: {0}\n\nThis is an internal error. Please report this issue at:\nhttps://github.com/hashpass/hashpass/issues")]
    Bug(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl HashpassError {
    /// The single message used for every decryption failure.
    pub fn unreadable() -> Self {
        HashpassError::Decrypt("unreadable".to_string())
    }

    /// Build a source query error.
    pub fn source_query(source_name: impl Into<String>, message: impl ToString) -> Self {
        HashpassError::SourceQuery {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

/// A specialized Result type for hashpass operations.
pub type Result<T> = std::result::Result<T, HashpassError>;

/// Helper macro to create and return a HashpassError::Bug
///
/// This should be used for conditions that should never occur
/// in normal operation and indicate a bug in hashpass itself.
///
/// # Example
///
/// ```ignore
/// if some_impossible_condition {
///     bug!("This should never happen: {:?}", condition);
/// }
/// ```
#[macro_export]
macro_rules! bug {
    ($msg:expr) => {
        return Err($crate::HashpassError::Bug($msg.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::HashpassError::Bug(format!($fmt, $($arg)*)))
    };
}

/// Helper macro to bail out with a HashpassError
///
/// This is used for expected error conditions.
///
/// # Example
///
/// ```ignore
/// if !valid {
///     bail!(Config, "Invalid configuration: {}", reason);
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($variant:ident, $msg:expr) => {
        return Err($crate::HashpassError::$variant($msg.to_string()))
    };
    ($variant:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::HashpassError::$variant(format!($fmt, $($arg)*)))
    };
    ($msg:expr) => {
        return Err($crate::HashpassError::Other($msg.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::HashpassError::Other(format!($fmt, $($arg)*)))
    };
}
