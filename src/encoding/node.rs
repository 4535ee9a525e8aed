//! # Array and Map Nodes
//!
//! Both node kinds are a small fixed prefix followed by a slot table of
//! exactly B slots, where B is the branching factor recorded in the file
//! header. Nodes always carry the full table, empty slots included, so the
//! encoded size of a node depends only on B.
//!
//! ```text
//! ArrayNode payload                      MapNode payload
//! +--------+------------+-------+        +------------+-------+
//! | height | slot_count | count |        | slot_count | count |
//! |  u8    |    u16     |  u64  |        |    u16     |  u64  |
//! +--------+------------+-------+        +------------+-------+
//! | slots[slot_count] (9B each) |        | slots[slot_count]  |
//! +-----------------------------+        +--------------------+
//! ```
//!
//! `count` is the number of elements (array) or entries (map) reachable
//! below the node. Lengths are answered from the root's `count` without a
//! traversal.

use eyre::{bail, Result};
use zerocopy::little_endian::{U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::slot::{decode_slots, encode_slots};
use super::Slot;
use crate::config::{ARRAY_NODE_FIXED_SIZE, MAP_NODE_FIXED_SIZE, SLOT_SIZE};
use crate::error::StoreError;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct ArrayNodePrefix {
    height: u8,
    slot_count: U16,
    count: U64,
}

const _: () = assert!(std::mem::size_of::<ArrayNodePrefix>() == ARRAY_NODE_FIXED_SIZE);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct MapNodePrefix {
    slot_count: U16,
    count: U64,
}

const _: () = assert!(std::mem::size_of::<MapNodePrefix>() == MAP_NODE_FIXED_SIZE);

/// Interior or terminal level of the persistent array tree.
///
/// Height 0 nodes hold leaf slots; height `h > 0` nodes hold child nodes of
/// height `h - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayNode {
    pub height: u8,
    pub count: u64,
    pub slots: Vec<Slot>,
}

impl ArrayNode {
    pub fn empty(height: u8, fanout: usize) -> Self {
        Self {
            height,
            count: 0,
            slots: vec![Slot::EMPTY; fanout],
        }
    }

    pub(crate) fn encoded_len(&self) -> usize {
        ARRAY_NODE_FIXED_SIZE + self.slots.len() * SLOT_SIZE
    }

    pub(crate) fn encode_payload(&self, out: &mut Vec<u8>) {
        let prefix = ArrayNodePrefix {
            height: self.height,
            slot_count: U16::new(self.slots.len() as u16),
            count: U64::new(self.count),
        };
        out.extend_from_slice(prefix.as_bytes());
        encode_slots(&self.slots, out);
    }

    pub(crate) fn decode_payload(payload: &[u8]) -> Result<Self> {
        let (prefix, rest) = ArrayNodePrefix::ref_from_prefix(payload).map_err(|_| {
            StoreError::format(format!(
                "array node payload of {} bytes is shorter than its {}-byte prefix",
                payload.len(),
                ARRAY_NODE_FIXED_SIZE
            ))
        })?;
        let slot_count = prefix.slot_count.get() as usize;
        if slot_count == 0 {
            bail!(StoreError::format("array node with zero slots"));
        }

        Ok(Self {
            height: prefix.height,
            count: prefix.count.get(),
            slots: decode_slots(rest, slot_count)?,
        })
    }
}

/// One level of the hash array mapped trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapNode {
    pub count: u64,
    pub slots: Vec<Slot>,
}

impl MapNode {
    pub fn empty(fanout: usize) -> Self {
        Self {
            count: 0,
            slots: vec![Slot::EMPTY; fanout],
        }
    }

    /// Number of non-empty slots.
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_empty()).count()
    }

    pub(crate) fn encoded_len(&self) -> usize {
        MAP_NODE_FIXED_SIZE + self.slots.len() * SLOT_SIZE
    }

    pub(crate) fn encode_payload(&self, out: &mut Vec<u8>) {
        let prefix = MapNodePrefix {
            slot_count: U16::new(self.slots.len() as u16),
            count: U64::new(self.count),
        };
        out.extend_from_slice(prefix.as_bytes());
        encode_slots(&self.slots, out);
    }

    pub(crate) fn decode_payload(payload: &[u8]) -> Result<Self> {
        let (prefix, rest) = MapNodePrefix::ref_from_prefix(payload).map_err(|_| {
            StoreError::format(format!(
                "map node payload of {} bytes is shorter than its {}-byte prefix",
                payload.len(),
                MAP_NODE_FIXED_SIZE
            ))
        })?;
        let slot_count = prefix.slot_count.get() as usize;
        if slot_count == 0 {
            bail!(StoreError::format("map node with zero slots"));
        }

        Ok(Self {
            count: prefix.count.get(),
            slots: decode_slots(rest, slot_count)?,
        })
    }
}
