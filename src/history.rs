//! # Version History
//!
//! Every commit appends one version block recording the root it produced and
//! the offset of the version it was derived from:
//!
//! ```text
//!   header.latest_version
//!          |
//!          v
//!   [v3 seq=3] --parent--> [v2 seq=2] --parent--> [v1 seq=1] --parent--> none
//! ```
//!
//! Versions are never edited or removed, so any version offset handed out
//! stays readable for the life of the file. Parents always sit at lower
//! offsets with a sequence exactly one smaller; a chain that breaks either
//! rule is reported as corrupt instead of being followed.

use std::sync::Arc;

use eyre::{ensure, Result, WrapErr};

use crate::encoding::{Block, RootKind, VersionBlock};
use crate::error::StoreError;
use crate::storage::blocks::{append_block, read_version};
use crate::storage::{BackingStore, FileHeader};
use crate::Offset;

/// A version block together with the offset it lives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRecord {
    pub offset: Offset,
    pub root_kind: RootKind,
    pub root: Option<Offset>,
    pub parent: Option<Offset>,
    pub timestamp_ms: u64,
    pub size: u64,
    pub sequence: u64,
}

impl VersionRecord {
    fn from_block(offset: Offset, block: VersionBlock) -> Self {
        Self {
            offset,
            root_kind: block.root_kind,
            root: block.root,
            parent: block.parent,
            timestamp_ms: block.timestamp_ms,
            size: block.size,
            sequence: block.sequence,
        }
    }

    fn block(&self) -> VersionBlock {
        VersionBlock {
            root_kind: self.root_kind,
            root: self.root,
            parent: self.parent,
            timestamp_ms: self.timestamp_ms,
            size: self.size,
            sequence: self.sequence,
        }
    }
}

/// Appends a version derived from `prior`. The caller publishes it by
/// writing a header that points at the returned offset.
pub fn commit(
    store: &dyn BackingStore,
    prior: Option<&VersionRecord>,
    root_kind: RootKind,
    root: Option<Offset>,
    size: u64,
    timestamp_ms: u64,
) -> Result<VersionRecord> {
    let mut record = VersionRecord {
        offset: 0,
        root_kind,
        root,
        parent: prior.map(|p| p.offset),
        timestamp_ms,
        size,
        sequence: prior.map_or(1, |p| p.sequence + 1),
    };
    record.offset = append_block(store, &Block::Version(record.block()))
        .wrap_err_with(|| format!("failed to append version {}", record.sequence))?;
    Ok(record)
}

pub fn read(store: &dyn BackingStore, offset: Offset) -> Result<VersionRecord> {
    let block = read_version(store, offset)?;
    Ok(VersionRecord::from_block(offset, block))
}

/// The version the header currently publishes.
pub fn latest(store: &dyn BackingStore, header: &FileHeader) -> Result<Option<VersionRecord>> {
    header
        .latest_version
        .map(|offset| {
            read(store, offset).wrap_err_with(|| {
                format!(
                    "failed to read latest version at offset {} (header sequence {})",
                    offset, header.sequence
                )
            })
        })
        .transpose()
}

pub fn parent_of(store: &dyn BackingStore, version: &VersionRecord) -> Result<Option<VersionRecord>> {
    let Some(offset) = version.parent else {
        return Ok(None);
    };

    ensure!(
        offset < version.offset,
        StoreError::format(format!(
            "version at offset {} names parent at later offset {}",
            version.offset, offset
        ))
    );
    let parent = read(store, offset)?;
    ensure!(
        parent.sequence + 1 == version.sequence,
        StoreError::format(format!(
            "version {} at offset {} has parent with sequence {}",
            version.sequence, version.offset, parent.sequence
        ))
    );
    Ok(Some(parent))
}

/// Walks the chain from a starting version back to the origin, most recent
/// first. Stops after the first error.
pub struct History {
    store: Arc<dyn BackingStore>,
    state: Walk,
}

enum Walk {
    Start(Option<Offset>),
    After(VersionRecord),
    Done,
}

impl History {
    pub fn new(store: Arc<dyn BackingStore>, start: Option<Offset>) -> Self {
        Self {
            store,
            state: Walk::Start(start),
        }
    }

    fn step(&mut self) -> Result<Option<VersionRecord>> {
        let next = match std::mem::replace(&mut self.state, Walk::Done) {
            Walk::Start(None) | Walk::Done => None,
            Walk::Start(Some(offset)) => Some(read(self.store.as_ref(), offset)?),
            Walk::After(current) => parent_of(self.store.as_ref(), &current)?,
        };
        if let Some(record) = next {
            self.state = Walk::After(record);
        }
        Ok(next)
    }
}

impl Iterator for History {
    type Item = Result<VersionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}
