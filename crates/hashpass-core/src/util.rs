//! Common utility functions.

pub mod data;
pub mod fs;

pub use data::deep_merge;
pub use fs::{expand_path, home_dir, unique_sibling, write_atomic};
