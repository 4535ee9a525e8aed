//! # cowdb Configuration Module
//!
//! This module centralizes the configuration constants for cowdb. Constants
//! that describe the on-disk format are co-located with the tunables that are
//! recorded in the file header, and their relationships are checked at compile
//! time.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency documentation

pub mod constants;
pub use constants::*;
