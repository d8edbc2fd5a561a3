//! # Hashpass Core
//!
//! Configuration management, logging, and filesystem helpers shared by the
//! hashpass crates.
//!
//! This crate provides:
//!
//! - **Configuration**: Layered configuration (defaults, file, overrides, environment)
//! - **Logging**: `tracing` setup with env filtering and optional file output
//! - **File Operations**: Path expansion, atomic writes, sibling temp paths
//!
//! ## Example
//!
//! ```no_run
//! use hashpass_core::config::HashpassConfig;
//!
//! let config = HashpassConfig::load()?;
//! let _guard = hashpass_core::log::init_from_config(&config.log)?;
//! # Ok::<(), hashpass_types::HashpassError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod log;
pub mod util;

pub use config::{Config, HashpassConfig};
pub use hashpass_types::{HashpassError, Result};

/// Hashpass library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hashpass application name
pub const APP_NAME: &str = "hashpass";
