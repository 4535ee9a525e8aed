//! # Block I/O
//!
//! Glue between a [`BackingStore`] and the pure codec in [`crate::encoding`].
//! A block read is two positional reads: the fixed 5-byte prefix, then the
//! payload whose length the prefix declares. No scanning is ever required.
//!
//! Typed readers (`read_array_node`, `read_map_node`, ...) turn a block of
//! the wrong kind into a format error, which is how a dangling or corrupted
//! offset is detected.

use eyre::{bail, Result, WrapErr};

use super::BackingStore;
use crate::config::{BLOCK_PREFIX_SIZE, HEADER_REGION_SIZE};
use crate::encoding::{self, ArrayNode, Block, KvLeaf, MapNode, VersionBlock};
use crate::error::StoreError;
use crate::Offset;

pub fn read_block(store: &dyn BackingStore, offset: Offset) -> Result<Block> {
    if offset < HEADER_REGION_SIZE as Offset {
        bail!(StoreError::format(format!(
            "block offset {} points into the header region",
            offset
        )));
    }

    let prefix = store
        .read_at(offset, BLOCK_PREFIX_SIZE)
        .wrap_err_with(|| format!("failed to read block prefix at offset {}", offset))?;
    let (tag, len) = encoding::decode_prefix(&prefix)
        .wrap_err_with(|| format!("invalid block prefix at offset {}", offset))?;

    let payload = store
        .read_at(offset + BLOCK_PREFIX_SIZE as Offset, len)
        .wrap_err_with(|| {
            format!(
                "failed to read {} payload bytes of {:?} block at offset {}",
                len, tag, offset
            )
        })?;

    encoding::decode_payload(tag, &payload)
        .wrap_err_with(|| format!("failed to decode {:?} block at offset {}", tag, offset))
}

pub fn append_block(store: &dyn BackingStore, block: &Block) -> Result<Offset> {
    let bytes = encoding::encode(block)?;
    store
        .append(&bytes)
        .wrap_err_with(|| format!("failed to append {:?} block", block.tag()))
}

fn unexpected(offset: Offset, expected: &str, found: &Block) -> eyre::Report {
    StoreError::format(format!(
        "expected {} at offset {}, found {:?} block",
        expected,
        offset,
        found.tag()
    ))
    .into()
}

pub fn read_array_node(store: &dyn BackingStore, offset: Offset) -> Result<ArrayNode> {
    match read_block(store, offset)? {
        Block::Array(node) => Ok(node),
        other => Err(unexpected(offset, "an array node", &other)),
    }
}

pub fn read_map_node(store: &dyn BackingStore, offset: Offset) -> Result<MapNode> {
    match read_block(store, offset)? {
        Block::Map(node) => Ok(node),
        other => Err(unexpected(offset, "a map node", &other)),
    }
}

pub fn read_leaf(store: &dyn BackingStore, offset: Offset) -> Result<Vec<u8>> {
    match read_block(store, offset)? {
        Block::Leaf(value) => Ok(value),
        other => Err(unexpected(offset, "a value leaf", &other)),
    }
}

pub fn read_kv_leaf(store: &dyn BackingStore, offset: Offset) -> Result<KvLeaf> {
    match read_block(store, offset)? {
        Block::KvLeaf(leaf) => Ok(leaf),
        other => Err(unexpected(offset, "a kv leaf", &other)),
    }
}

pub fn read_version(store: &dyn BackingStore, offset: Offset) -> Result<VersionBlock> {
    match read_block(store, offset)? {
        Block::Version(version) => Ok(version),
        other => Err(unexpected(offset, "a version record", &other)),
    }
}
