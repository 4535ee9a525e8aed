//! # File Header
//!
//! The first 128 bytes of every store hold two copies ("slots") of the file
//! header. Each slot is a zerocopy struct protected by a CRC-64 checksum.
//!
//! ## Slot Layout (64 bytes, little-endian)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  ------------------
//!  0       8    magic              b"cowdb\0\0\x01"
//!  8       2    format_version
//! 10       2    branching_factor   B, power of two
//! 12       2    hash_version       key hash function id
//! 14       1    collapse_threshold map delete collapse tunable
//! 15       1    flags              reserved, zero
//! 16       8    sequence           header generation, +1 per commit
//! 24       8    latest_version     offset of newest version block, 0 = none
//! 32       8    version_count
//! 40       8    committed_len      store length when this header was written
//! 48       8    reserved
//! 56       8    checksum           CRC-64/ECMA-182 over bytes 0..56
//! ```
//!
//! ## Replace-Then-Sync
//!
//! Header generation `s` always lives in slot `s % 2`. Publishing generation
//! `s + 1` therefore overwrites the *other* slot and syncs:
//!
//! ```text
//! slot A: seq 4 (current)     slot B: seq 3 (stale)
//!                     write seq 5 into B, fsync
//! slot A: seq 4 (stale)       slot B: seq 5 (current)
//! ```
//!
//! A crash during the write can only tear slot B. On open, a torn slot fails
//! its checksum and the reader falls back to slot A, so the visible header is
//! always either the complete old one or the complete new one.
//!
//! Without syncs the operating system may persist slot B before the blocks
//! it commits. A valid slot whose `committed_len` exceeds the store length is
//! therefore skipped in favor of the older slot.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{bail, Result};
use tracing::{debug, warn};
use zerocopy::little_endian::{U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::BackingStore;
use crate::config::{
    FORMAT_VERSION, HASH_VERSION_XXH3, HEADER_REGION_SIZE, HEADER_SLOT_COUNT, HEADER_SLOT_SIZE,
    MAGIC, MAX_BRANCHING_FACTOR, MAX_COLLAPSE_THRESHOLD, MIN_BRANCHING_FACTOR,
};
use crate::error::StoreError;
use crate::Offset;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

const CHECKSUM_OFFSET: usize = HEADER_SLOT_SIZE - 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct HeaderSlot {
    magic: [u8; 8],
    format_version: U16,
    branching_factor: U16,
    hash_version: U16,
    collapse_threshold: u8,
    flags: u8,
    sequence: U64,
    latest_version: U64,
    version_count: U64,
    committed_len: U64,
    reserved: [u8; 8],
    checksum: U64,
}

const _: () = assert!(std::mem::size_of::<HeaderSlot>() == HEADER_SLOT_SIZE);

/// Outcome of inspecting one header slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Valid(FileHeader),
    BadMagic,
    UnsupportedVersion(u16),
    Corrupt,
}

impl HeaderSlot {
    pub fn new(header: &FileHeader) -> Self {
        let mut slot = Self {
            magic: *MAGIC,
            format_version: U16::new(FORMAT_VERSION),
            branching_factor: U16::new(header.branching_factor),
            hash_version: U16::new(header.hash_version),
            collapse_threshold: header.collapse_threshold,
            flags: 0,
            sequence: U64::new(header.sequence),
            latest_version: U64::new(header.latest_version.unwrap_or(0)),
            version_count: U64::new(header.version_count),
            committed_len: U64::new(header.committed_len),
            reserved: [0u8; 8],
            checksum: U64::new(0),
        };
        slot.checksum = U64::new(slot.compute_checksum());
        slot
    }

    fn compute_checksum(&self) -> u64 {
        CRC64.checksum(&self.as_bytes()[..CHECKSUM_OFFSET])
    }

    /// Classifies raw slot bytes without failing.
    pub fn inspect(bytes: &[u8]) -> SlotState {
        let Ok(slot) = Self::ref_from_bytes(bytes) else {
            return SlotState::Corrupt;
        };

        if &slot.magic != MAGIC {
            return SlotState::BadMagic;
        }
        if slot.checksum.get() != slot.compute_checksum() {
            return SlotState::Corrupt;
        }
        if slot.format_version.get() != FORMAT_VERSION {
            return SlotState::UnsupportedVersion(slot.format_version.get());
        }

        let latest = slot.latest_version.get();
        SlotState::Valid(FileHeader {
            branching_factor: slot.branching_factor.get(),
            hash_version: slot.hash_version.get(),
            collapse_threshold: slot.collapse_threshold,
            sequence: slot.sequence.get(),
            latest_version: (latest != 0).then_some(latest),
            version_count: slot.version_count.get(),
            committed_len: slot.committed_len.get(),
        })
    }
}

/// Decoded, validated header contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub branching_factor: u16,
    pub hash_version: u16,
    pub collapse_threshold: u8,
    pub sequence: u64,
    pub latest_version: Option<Offset>,
    pub version_count: u64,
    pub committed_len: u64,
}

impl FileHeader {
    /// Header for a store that has no versions yet.
    pub fn new(branching_factor: u16, hash_version: u16, collapse_threshold: u8) -> Self {
        Self {
            branching_factor,
            hash_version,
            collapse_threshold,
            sequence: 1,
            latest_version: None,
            version_count: 0,
            committed_len: HEADER_REGION_SIZE as u64,
        }
    }

    /// Checks the tunables recorded in the header against what this build
    /// can interpret.
    pub fn validate(&self) -> Result<()> {
        let b = self.branching_factor;
        if !b.is_power_of_two() || !(MIN_BRANCHING_FACTOR..=MAX_BRANCHING_FACTOR).contains(&b) {
            bail!(StoreError::format(format!(
                "unsupported branching factor {} (expected a power of two in {}..={})",
                b, MIN_BRANCHING_FACTOR, MAX_BRANCHING_FACTOR
            )));
        }
        if self.hash_version != HASH_VERSION_XXH3 {
            bail!(StoreError::format(format!(
                "unsupported hash function version {} (expected {})",
                self.hash_version, HASH_VERSION_XXH3
            )));
        }
        if self.collapse_threshold > MAX_COLLAPSE_THRESHOLD {
            bail!(StoreError::format(format!(
                "unsupported collapse threshold {} (max {})",
                self.collapse_threshold, MAX_COLLAPSE_THRESHOLD
            )));
        }
        Ok(())
    }

    /// Slot index this generation is stored in.
    pub fn slot_index(&self) -> usize {
        (self.sequence % HEADER_SLOT_COUNT as u64) as usize
    }

    /// The successor header publishing `latest_version`.
    pub fn next(&self, latest_version: Offset, committed_len: u64) -> Self {
        Self {
            sequence: self.sequence + 1,
            latest_version: Some(latest_version),
            version_count: self.version_count + 1,
            committed_len,
            ..*self
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SLOT_SIZE] {
        let mut out = [0u8; HEADER_SLOT_SIZE];
        out.copy_from_slice(HeaderSlot::new(self).as_bytes());
        out
    }

    /// Bytes of a freshly initialized header region. Both slots are valid so
    /// the first published generation can overwrite either one safely.
    pub fn initial_region(&self) -> Vec<u8> {
        let mut region = vec![0u8; HEADER_REGION_SIZE];
        let previous = Self {
            sequence: self.sequence - 1,
            ..*self
        };
        for header in [previous, *self] {
            let start = header.slot_index() * HEADER_SLOT_SIZE;
            region[start..start + HEADER_SLOT_SIZE].copy_from_slice(&header.to_bytes());
        }
        region
    }

    /// Reads both slots and returns the newest valid header whose committed
    /// length fits the store.
    pub fn read(store: &dyn BackingStore) -> Result<Self> {
        if store.len() < HEADER_REGION_SIZE as u64 {
            bail!(StoreError::format(format!(
                "store is {} bytes, too short for the {}-byte header",
                store.len(),
                HEADER_REGION_SIZE
            )));
        }

        let region = store.read_at(0, HEADER_REGION_SIZE)?;
        let states: Vec<SlotState> = region
            .chunks_exact(HEADER_SLOT_SIZE)
            .map(HeaderSlot::inspect)
            .collect();

        let mut valid: Vec<FileHeader> = states
            .iter()
            .filter_map(|state| match state {
                SlotState::Valid(header) => Some(*header),
                _ => None,
            })
            .collect();
        valid.sort_by_key(|header| std::cmp::Reverse(header.sequence));

        if let Some(newest) = valid.first().copied() {
            for (index, state) in states.iter().enumerate() {
                if matches!(state, SlotState::Corrupt | SlotState::BadMagic) {
                    warn!(
                        slot = index,
                        sequence = newest.sequence,
                        "header slot failed validation, using the other copy"
                    );
                }
            }

            let len = store.len();
            let Some(header) = valid.into_iter().find(|h| h.committed_len <= len) else {
                bail!(StoreError::format(format!(
                    "store is {} bytes but the header commits {} bytes",
                    len, newest.committed_len
                )));
            };
            if header.sequence != newest.sequence {
                warn!(
                    sequence = newest.sequence,
                    committed_len = newest.committed_len,
                    file_len = len,
                    "newest header commits bytes past the end of the store, using the previous one"
                );
            }

            debug!(
                slot = header.slot_index(),
                sequence = header.sequence,
                latest_version = ?header.latest_version,
                "selected header slot"
            );
            header.validate()?;
            return Ok(header);
        }

        if let Some(version) = states.iter().find_map(|state| match state {
            SlotState::UnsupportedVersion(v) => Some(*v),
            _ => None,
        }) {
            bail!(StoreError::format(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        if states.iter().all(|state| *state == SlotState::BadMagic) {
            bail!(StoreError::format("invalid magic bytes, not a cowdb store"));
        }

        bail!(StoreError::format("both header slots are corrupt"))
    }

    /// Writes this generation into its slot. Callers flush afterwards.
    pub fn write(&self, store: &dyn BackingStore) -> Result<()> {
        store.write_header_slot(self.slot_index(), &self.to_bytes())
    }
}
