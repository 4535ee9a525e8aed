//! Version block payload.
//!
//! ```text
//! +-----------+------+--------+--------------+------+----------+
//! | root_kind | root | parent | timestamp_ms | size | sequence |
//! | u8        | u64  | u64    | u64          | u64  | u64      |
//! +-----------+------+--------+--------------+------+----------+
//! ```
//!
//! `root` and `parent` use 0 for "none". `size` is the element or entry
//! count of the root collection at this version.

use eyre::{bail, Result};
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::VERSION_BLOCK_SIZE;
use crate::error::StoreError;
use crate::Offset;

/// Which collection a version's root points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootKind {
    #[default]
    Empty,
    Array,
    Map,
    Set,
}

impl RootKind {
    pub fn name(self) -> &'static str {
        match self {
            RootKind::Empty => "nothing",
            RootKind::Array => "an array",
            RootKind::Map => "a map",
            RootKind::Set => "a set",
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RootKind::Empty => 0,
            RootKind::Array => 1,
            RootKind::Map => 2,
            RootKind::Set => 3,
        }
    }
}

impl TryFrom<u8> for RootKind {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RootKind::Empty),
            1 => Ok(RootKind::Array),
            2 => Ok(RootKind::Map),
            3 => Ok(RootKind::Set),
            other => bail!(StoreError::format(format!("unknown root kind {}", other))),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct RawVersion {
    root_kind: u8,
    root: U64,
    parent: U64,
    timestamp_ms: U64,
    size: U64,
    sequence: U64,
}

const _: () = assert!(std::mem::size_of::<RawVersion>() == VERSION_BLOCK_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionBlock {
    pub root_kind: RootKind,
    pub root: Option<Offset>,
    pub parent: Option<Offset>,
    pub timestamp_ms: u64,
    pub size: u64,
    pub sequence: u64,
}

impl VersionBlock {
    pub(crate) fn encode_payload(&self, out: &mut Vec<u8>) {
        let raw = RawVersion {
            root_kind: self.root_kind.as_u8(),
            root: U64::new(self.root.unwrap_or(0)),
            parent: U64::new(self.parent.unwrap_or(0)),
            timestamp_ms: U64::new(self.timestamp_ms),
            size: U64::new(self.size),
            sequence: U64::new(self.sequence),
        };
        out.extend_from_slice(raw.as_bytes());
    }

    pub(crate) fn decode_payload(payload: &[u8]) -> Result<Self> {
        let raw = RawVersion::ref_from_bytes(payload).map_err(|_| {
            StoreError::format(format!(
                "version payload is {} bytes, expected {}",
                payload.len(),
                VERSION_BLOCK_SIZE
            ))
        })?;

        let root_kind = RootKind::try_from(raw.root_kind)?;
        let root = raw.root.get();
        let parent = raw.parent.get();

        // An emptied collection keeps its kind with root 0; the reverse is corrupt.
        if root_kind == RootKind::Empty && root != 0 {
            bail!(StoreError::format(format!(
                "version without a root kind points at root offset {}",
                root
            )));
        }

        Ok(Self {
            root_kind,
            root: (root != 0).then_some(root),
            parent: (parent != 0).then_some(parent),
            timestamp_ms: raw.timestamp_ms.get(),
            size: raw.size.get(),
            sequence: raw.sequence.get(),
        })
    }
}
