//! # Node Slots
//!
//! Array and map nodes are tables of fixed-stride 9-byte slots, so slot `i`
//! of a node always sits at `slot_table + i * SLOT_SIZE`:
//!
//! ```text
//! +------+---------------------------+
//! | kind | offset (u64 little-endian)|
//! +------+---------------------------+
//!   1B            8B
//! ```
//!
//! | kind | Meaning                                  |
//! |------|------------------------------------------|
//! | 0    | empty, offset must be 0                  |
//! | 1    | child node (array node or map node)      |
//! | 2    | leaf (value leaf or KV leaf chain head)  |

use eyre::{bail, Result};
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::SLOT_SIZE;
use crate::error::StoreError;
use crate::Offset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotKind {
    #[default]
    Empty,
    Node,
    Leaf,
}

impl SlotKind {
    fn as_u8(self) -> u8 {
        match self {
            SlotKind::Empty => 0,
            SlotKind::Node => 1,
            SlotKind::Leaf => 2,
        }
    }
}

impl TryFrom<u8> for SlotKind {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SlotKind::Empty),
            1 => Ok(SlotKind::Node),
            2 => Ok(SlotKind::Leaf),
            other => bail!(StoreError::format(format!("unknown slot kind {}", other))),
        }
    }
}

/// One child reference inside a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    pub kind: SlotKind,
    pub offset: Offset,
}

impl Slot {
    pub const EMPTY: Slot = Slot {
        kind: SlotKind::Empty,
        offset: 0,
    };

    pub fn node(offset: Offset) -> Self {
        Self {
            kind: SlotKind::Node,
            offset,
        }
    }

    pub fn leaf(offset: Offset) -> Self {
        Self {
            kind: SlotKind::Leaf,
            offset,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind == SlotKind::Empty
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub(crate) struct RawSlot {
    kind: u8,
    offset: U64,
}

const _: () = assert!(std::mem::size_of::<RawSlot>() == SLOT_SIZE);

impl From<Slot> for RawSlot {
    fn from(slot: Slot) -> Self {
        Self {
            kind: slot.kind.as_u8(),
            offset: U64::new(slot.offset),
        }
    }
}

impl TryFrom<&RawSlot> for Slot {
    type Error = eyre::Report;

    fn try_from(raw: &RawSlot) -> Result<Self> {
        let kind = SlotKind::try_from(raw.kind)?;
        let offset = raw.offset.get();

        match kind {
            SlotKind::Empty if offset != 0 => bail!(StoreError::format(format!(
                "empty slot carries offset {}",
                offset
            ))),
            SlotKind::Node | SlotKind::Leaf if offset == 0 => bail!(StoreError::format(
                "occupied slot points at offset 0"
            )),
            _ => Ok(Slot { kind, offset }),
        }
    }
}

/// Appends the fixed-stride encoding of `slots` to `out`.
pub(crate) fn encode_slots(slots: &[Slot], out: &mut Vec<u8>) {
    out.reserve(slots.len() * SLOT_SIZE);
    for slot in slots {
        out.extend_from_slice(RawSlot::from(*slot).as_bytes());
    }
}

/// Decodes exactly `count` slots from `bytes`, which must be `count * SLOT_SIZE` long.
pub(crate) fn decode_slots(bytes: &[u8], count: usize) -> Result<Vec<Slot>> {
    if bytes.len() != count * SLOT_SIZE {
        bail!(StoreError::format(format!(
            "slot table is {} bytes, expected {} for {} slots",
            bytes.len(),
            count * SLOT_SIZE,
            count
        )));
    }

    let raw = <[RawSlot]>::ref_from_bytes(bytes)
        .map_err(|e| StoreError::format(format!("failed to parse slot table: {:?}", e)))?;
    raw.iter().map(Slot::try_from).collect()
}
