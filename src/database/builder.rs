//! # Store Builder
//!
//! `StoreBuilder` collects open options before `open()` creates or opens a
//! store.
//!
//! ## Configuration Options
//!
//! | Option               | Default              | Description                                |
//! |----------------------|----------------------|--------------------------------------------|
//! | path                 | none                 | Store file path                            |
//! | in_memory            | false                | Use an ephemeral `MemoryStore`             |
//! | branching_factor     | 32                   | B, power of two in 4..=256                 |
//! | collapse_threshold   | 1                    | Map delete collapse threshold (0 or 1)     |
//! | durability           | `Durability::Full`   | Whether commits fsync                      |
//! | create_if_missing    | true                 | Create the file when it does not exist     |
//!
//! ## Header-Resident Settings
//!
//! The branching factor, hash function and collapse threshold are written
//! into the header when a store is created and read back from it afterwards.
//! Reopening with an explicitly requested branching factor that differs from
//! the file's is a format error, since every node in the file has exactly B
//! slots. A differing collapse threshold is ignored with a warning.
//!
//! ```ignore
//! let store = Store::builder()
//!     .path("./versions.cow")
//!     .branching_factor(16)
//!     .durability(Durability::None)
//!     .open()?;
//! ```

use std::path::{Path, PathBuf};

use eyre::{bail, Result};

use super::Store;
use crate::config::{
    DEFAULT_BRANCHING_FACTOR, DEFAULT_COLLAPSE_THRESHOLD, MAX_BRANCHING_FACTOR,
    MAX_COLLAPSE_THRESHOLD, MIN_BRANCHING_FACTOR,
};
use crate::error::StoreError;

/// Whether a commit waits for the operating system to persist its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Sync appended blocks before the header swap and the header after it.
    #[default]
    Full,
    /// Skip every sync. A crash may lose recent commits. If the newest header
    /// slot reached the disk before the blocks it commits, opening falls back
    /// to the previous slot.
    None,
}

#[derive(Debug, Clone)]
pub struct StoreBuilder {
    path: Option<PathBuf>,
    in_memory: bool,
    branching_factor: Option<u16>,
    collapse_threshold: Option<u8>,
    durability: Durability,
    create_if_missing: bool,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            path: None,
            in_memory: false,
            branching_factor: None,
            collapse_threshold: None,
            durability: Durability::Full,
            create_if_missing: true,
        }
    }

    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Keeps the store in memory. Takes precedence over `path`.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    pub fn branching_factor(mut self, branching_factor: u16) -> Self {
        self.branching_factor = Some(branching_factor);
        self
    }

    pub fn collapse_threshold(mut self, collapse_threshold: u8) -> Self {
        self.collapse_threshold = Some(collapse_threshold);
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn open(self) -> Result<Store> {
        Store::open_with(self)
    }

    pub(crate) fn target(&self) -> Option<&Path> {
        if self.in_memory {
            None
        } else {
            self.path.as_deref()
        }
    }

    pub(crate) fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    pub(crate) fn requested_branching_factor(&self) -> Option<u16> {
        self.branching_factor
    }

    pub(crate) fn requested_collapse_threshold(&self) -> Option<u8> {
        self.collapse_threshold
    }

    pub(crate) fn durability_mode(&self) -> Durability {
        self.durability
    }

    pub(crate) fn creates_missing(&self) -> bool {
        self.create_if_missing
    }

    /// Validated tunables for a store about to be created.
    pub(crate) fn creation_params(&self) -> Result<(u16, u8)> {
        let b = self.branching_factor.unwrap_or(DEFAULT_BRANCHING_FACTOR);
        if !b.is_power_of_two() || !(MIN_BRANCHING_FACTOR..=MAX_BRANCHING_FACTOR).contains(&b) {
            bail!(StoreError::format(format!(
                "branching factor {} is not a power of two in {}..={}",
                b, MIN_BRANCHING_FACTOR, MAX_BRANCHING_FACTOR
            )));
        }

        let collapse = self.collapse_threshold.unwrap_or(DEFAULT_COLLAPSE_THRESHOLD);
        if collapse > MAX_COLLAPSE_THRESHOLD {
            bail!(StoreError::format(format!(
                "collapse threshold {} exceeds the maximum of {}",
                collapse, MAX_COLLAPSE_THRESHOLD
            )));
        }

        Ok((b, collapse))
    }
}
