//! # Encoding Module
//!
//! This module is the node codec of cowdb: a pure, stateless translation
//! between in-memory block values and their on-disk bytes. It never performs
//! I/O; [`crate::storage::blocks`] moves the bytes.
//!
//! ## Block Format
//!
//! Every block in the append-only stream is self-describing:
//!
//! ```text
//! +-----+----------------+---------------------+
//! | tag | payload length | payload             |
//! | u8  | u32 LE         | `length` bytes      |
//! +-----+----------------+---------------------+
//! ```
//!
//! | Tag | Block        | Payload                                   |
//! |-----|--------------|-------------------------------------------|
//! | 1   | ArrayNode    | height, slot count, count, slots          |
//! | 2   | MapNode      | slot count, count, slots                  |
//! | 3   | Leaf         | raw value bytes                           |
//! | 4   | KvLeaf       | hash, next, key length, key, value        |
//! | 5   | Version      | root kind, root, parent, timestamp, size  |
//!
//! All multi-byte integers are little-endian and all fixed-size parts are
//! zerocopy structs, so decoding a node is a bounds check plus a cast.
//!
//! ## Errors
//!
//! Every decode failure (unknown tag, truncated block, length mismatch,
//! unknown slot or root kind) is a `StoreError::Format`.
//!
//! ## Module Organization
//!
//! - `slot`: fixed-stride slot encoding
//! - `node`: `ArrayNode` and `MapNode`
//! - `leaf`: `KvLeaf`
//! - `version`: `VersionBlock` and `RootKind`

mod leaf;
mod node;
mod slot;
mod version;

pub use leaf::KvLeaf;
pub use node::{ArrayNode, MapNode};
pub use slot::{Slot, SlotKind};
pub use version::{RootKind, VersionBlock};

use eyre::{bail, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{BLOCK_PREFIX_SIZE, MAX_BLOCK_PAYLOAD, VERSION_BLOCK_SIZE};
use crate::error::StoreError;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub(crate) struct BlockPrefix {
    tag: u8,
    len: U32,
}

const _: () = assert!(std::mem::size_of::<BlockPrefix>() == BLOCK_PREFIX_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    ArrayNode,
    MapNode,
    Leaf,
    KvLeaf,
    Version,
}

impl BlockTag {
    pub fn as_u8(self) -> u8 {
        match self {
            BlockTag::ArrayNode => 1,
            BlockTag::MapNode => 2,
            BlockTag::Leaf => 3,
            BlockTag::KvLeaf => 4,
            BlockTag::Version => 5,
        }
    }
}

impl TryFrom<u8> for BlockTag {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(BlockTag::ArrayNode),
            2 => Ok(BlockTag::MapNode),
            3 => Ok(BlockTag::Leaf),
            4 => Ok(BlockTag::KvLeaf),
            5 => Ok(BlockTag::Version),
            other => bail!(StoreError::format(format!("unknown block tag {}", other))),
        }
    }
}

/// Any block that can live in the append-only stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Array(ArrayNode),
    Map(MapNode),
    Leaf(Vec<u8>),
    KvLeaf(KvLeaf),
    Version(VersionBlock),
}

impl Block {
    pub fn tag(&self) -> BlockTag {
        match self {
            Block::Array(_) => BlockTag::ArrayNode,
            Block::Map(_) => BlockTag::MapNode,
            Block::Leaf(_) => BlockTag::Leaf,
            Block::KvLeaf(_) => BlockTag::KvLeaf,
            Block::Version(_) => BlockTag::Version,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Block::Array(node) => node.encoded_len(),
            Block::Map(node) => node.encoded_len(),
            Block::Leaf(value) => value.len(),
            Block::KvLeaf(leaf) => leaf.encoded_len(),
            Block::Version(_) => VERSION_BLOCK_SIZE,
        }
    }
}

/// Reads the tag and payload length from the first `BLOCK_PREFIX_SIZE` bytes.
pub fn decode_prefix(bytes: &[u8]) -> Result<(BlockTag, usize)> {
    let (prefix, _) = BlockPrefix::ref_from_prefix(bytes).map_err(|_| {
        StoreError::format(format!(
            "block of {} bytes is shorter than its {}-byte prefix",
            bytes.len(),
            BLOCK_PREFIX_SIZE
        ))
    })?;
    Ok((BlockTag::try_from(prefix.tag)?, prefix.len.get() as usize))
}

/// Encodes a block including its tag/length prefix.
pub fn encode(block: &Block) -> Result<Vec<u8>> {
    let payload_len = block.payload_len();
    if payload_len > MAX_BLOCK_PAYLOAD {
        bail!(StoreError::format(format!(
            "block payload of {} bytes exceeds the {} byte limit",
            payload_len, MAX_BLOCK_PAYLOAD
        )));
    }

    let mut out = Vec::with_capacity(BLOCK_PREFIX_SIZE + payload_len);
    let prefix = BlockPrefix {
        tag: block.tag().as_u8(),
        len: U32::new(payload_len as u32),
    };
    out.extend_from_slice(prefix.as_bytes());

    match block {
        Block::Array(node) => node.encode_payload(&mut out),
        Block::Map(node) => node.encode_payload(&mut out),
        Block::Leaf(value) => out.extend_from_slice(value),
        Block::KvLeaf(leaf) => leaf.encode_payload(&mut out),
        Block::Version(version) => version.encode_payload(&mut out),
    }

    debug_assert_eq!(out.len(), BLOCK_PREFIX_SIZE + payload_len);
    Ok(out)
}

/// Decodes one complete block. `bytes` must be exactly prefix + payload.
pub fn decode(bytes: &[u8]) -> Result<Block> {
    let (tag, len) = decode_prefix(bytes)?;
    let payload = &bytes[BLOCK_PREFIX_SIZE..];
    if payload.len() != len {
        bail!(StoreError::format(format!(
            "{:?} block declares {} payload bytes but {} are present",
            tag,
            len,
            payload.len()
        )));
    }
    decode_payload(tag, payload)
}

/// Decodes a payload whose tag was already read from the prefix.
pub fn decode_payload(tag: BlockTag, payload: &[u8]) -> Result<Block> {
    Ok(match tag {
        BlockTag::ArrayNode => Block::Array(ArrayNode::decode_payload(payload)?),
        BlockTag::MapNode => Block::Map(MapNode::decode_payload(payload)?),
        BlockTag::Leaf => Block::Leaf(payload.to_vec()),
        BlockTag::KvLeaf => Block::KvLeaf(KvLeaf::decode_payload(payload)?),
        BlockTag::Version => Block::Version(VersionBlock::decode_payload(payload)?),
    })
}

/// Encodes an array value leaf.
pub fn encode_leaf(value: &[u8]) -> Result<Vec<u8>> {
    encode(&Block::Leaf(value.to_vec()))
}

/// Decodes an array value leaf, rejecting any other block kind.
pub fn decode_leaf(bytes: &[u8]) -> Result<Vec<u8>> {
    match decode(bytes)? {
        Block::Leaf(value) => Ok(value),
        other => bail!(StoreError::format(format!(
            "expected a leaf block, found {:?}",
            other.tag()
        ))),
    }
}
