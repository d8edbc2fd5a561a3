//! # Hashpass Types
//!
//! Core types, traits, and enums shared across all hashpass crates.
//!
//! This crate provides the fundamental building blocks for the hashpass
//! password generator, including:
//!
//! - Validated service and source names
//! - Character classes and the canonical alphabet order
//! - Settings records as stored on sources
//! - Traits for storage sources, signers, and confirmation prompts
//! - Error types and result aliases
//!
//! ## Example
//!
//! ```
//! use hashpass_types::{CharClass, ServiceName, ServiceSettings};
//!
//! let svc = ServiceName::new("google").unwrap();
//! assert_eq!(svc.as_str(), "google");
//!
//! let settings: ServiceSettings = serde_json::from_str(r#"{"symbol": 0}"#).unwrap();
//! assert!(settings.class(CharClass::Symbol).unwrap().is_excluded());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod identifiers;
pub mod enums;
pub mod settings;
pub mod traits;
pub mod config;

// Re-export common types for convenience
pub use errors::{HashpassError, Result};
pub use identifiers::{ServiceName, SourceName};
pub use enums::{CharClass, LogLevel, SourceKind, CANONICAL_CHARS};
pub use settings::{ClassValue, ServiceSettings, SettingsRecord};
pub use traits::{Confirmer, Signer, Source};
