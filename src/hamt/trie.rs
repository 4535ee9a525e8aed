//! # Hash Array Mapped Trie
//!
//! The persistent map is a trie of [`MapNode`]s indexed by consecutive
//! `log2(B)`-bit groups of a 64-bit key hash, least significant group first.
//! Like the array, every operation takes a root and returns a new root and
//! never touches bytes reachable from the old one.
//!
//! ## Slots
//!
//! ```text
//!               depth 0 node
//!   [ -- | leaf | node | -- ]          slot = hash bits [0, 2)   (B = 4)
//!            |      |
//!            |    depth 1 node
//!            |    [ leaf | -- | leaf | -- ]   slot = hash bits [2, 4)
//!            |
//!          KV leaf  ->  KV leaf  ->  none     overflow chain (equal hashes)
//! ```
//!
//! ## Insert
//!
//! - empty slot: write a KV leaf there
//! - child node: recurse one level deeper
//! - leaf with the same full hash: replace the entry in the chain, or prepend
//!   a new entry sharing the old chain as its tail
//! - leaf with a different hash: replace it with a new child node holding the
//!   old chain at the next bit-group, then recurse into that child. Depth
//!   grows, breadth never does.
//!
//! ## Delete
//!
//! The mirror of insert. On the way back up, a non-root child left with no
//! live slots becomes an empty slot, and one left with a single leaf slot is
//! folded into its parent when the header's collapse threshold allows it.
//! Lookups compare full keys at leaves, so a leaf may sit at any depth along
//! its hash path.
//!
//! ## Counts
//!
//! Each node counts the entries beneath it, which makes `len` O(1) and lets
//! a delete that empties the map return the empty root.

use eyre::{bail, Result};

use super::iter::{KeyIter, MapIter};
use crate::encoding::{Block, KvLeaf, MapNode, Slot, SlotKind};
use crate::error::StoreError;
use crate::hash::{max_depth, slot_index, KeyHasher};
use crate::storage::blocks::{append_block, read_kv_leaf, read_map_node};
use crate::storage::BackingStore;
use crate::Offset;

#[derive(Debug, Clone, Copy)]
pub struct HashTrie<'a> {
    store: &'a dyn BackingStore,
    fanout: usize,
    bits: u32,
    hasher: KeyHasher,
    collapse_threshold: u8,
}

impl<'a> HashTrie<'a> {
    pub fn new(
        store: &'a dyn BackingStore,
        fanout: usize,
        hasher: KeyHasher,
        collapse_threshold: u8,
    ) -> Self {
        debug_assert!(fanout.is_power_of_two());
        Self {
            store,
            fanout,
            bits: fanout.trailing_zeros(),
            hasher,
            collapse_threshold,
        }
    }

    pub fn hash(&self, key: &[u8]) -> u64 {
        self.hasher.hash(key)
    }

    fn index(&self, hash: u64, depth: u32) -> Result<usize> {
        match slot_index(hash, depth, self.bits) {
            Some(index) => Ok(index),
            None => bail!(StoreError::format(format!(
                "map trie depth {} exceeds the {} levels a 64-bit hash allows",
                depth,
                max_depth(self.bits)
            ))),
        }
    }

    pub(crate) fn load(&self, offset: Offset) -> Result<MapNode> {
        let node = read_map_node(self.store, offset)?;
        if node.slots.len() != self.fanout {
            bail!(StoreError::format(format!(
                "map node at offset {} has {} slots, store branching factor is {}",
                offset,
                node.slots.len(),
                self.fanout
            )));
        }
        Ok(node)
    }

    pub(crate) fn load_leaf(&self, offset: Offset) -> Result<KvLeaf> {
        read_kv_leaf(self.store, offset)
    }

    fn write(&self, node: MapNode) -> Result<Offset> {
        append_block(self.store, &Block::Map(node))
    }

    fn write_leaf(&self, leaf: KvLeaf) -> Result<Offset> {
        append_block(self.store, &Block::KvLeaf(leaf))
    }

    pub fn len(&self, root: Option<Offset>) -> Result<u64> {
        match root {
            Some(offset) => Ok(self.load(offset)?.count),
            None => Ok(0),
        }
    }

    pub fn get(&self, root: Option<Offset>, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_hashed(root, self.hash(key), key)
    }

    pub fn contains_key(&self, root: Option<Offset>, key: &[u8]) -> Result<bool> {
        Ok(self.get(root, key)?.is_some())
    }

    pub(crate) fn get_hashed(
        &self,
        root: Option<Offset>,
        hash: u64,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let Some(root) = root else {
            return Ok(None);
        };

        let mut node = self.load(root)?;
        let mut depth = 0;
        loop {
            let slot = node.slots[self.index(hash, depth)?];
            match slot.kind {
                SlotKind::Empty => return Ok(None),
                SlotKind::Node => {
                    node = self.load(slot.offset)?;
                    depth += 1;
                }
                SlotKind::Leaf => return self.find_in_chain(slot.offset, hash, key),
            }
        }
    }

    fn find_in_chain(&self, head: Offset, hash: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut next = Some(head);
        while let Some(offset) = next {
            let leaf = self.load_leaf(offset)?;
            if leaf.hash != hash {
                return Ok(None);
            }
            if leaf.key == key {
                return Ok(Some(leaf.value));
            }
            next = leaf.next;
        }
        Ok(None)
    }

    /// Inserts or replaces `key`. Returns the new root and whether the key
    /// was not present before.
    pub fn set(&self, root: Option<Offset>, key: &[u8], value: &[u8]) -> Result<(Offset, bool)> {
        self.set_hashed(root, self.hash(key), key, value)
    }

    pub(crate) fn set_hashed(
        &self,
        root: Option<Offset>,
        hash: u64,
        key: &[u8],
        value: &[u8],
    ) -> Result<(Offset, bool)> {
        let node = match root {
            Some(offset) => self.load(offset)?,
            None => MapNode::empty(self.fanout),
        };
        let (node, inserted) = self.insert_into(node, hash, key, value, 0)?;
        Ok((self.write(node)?, inserted))
    }

    fn insert_into(
        &self,
        mut node: MapNode,
        hash: u64,
        key: &[u8],
        value: &[u8],
        depth: u32,
    ) -> Result<(MapNode, bool)> {
        let at = self.index(hash, depth)?;
        let slot = node.slots[at];

        let (slot, inserted) = match slot.kind {
            SlotKind::Empty => {
                let leaf = KvLeaf {
                    hash,
                    next: None,
                    key: key.to_vec(),
                    value: value.to_vec(),
                };
                (Slot::leaf(self.write_leaf(leaf)?), true)
            }
            SlotKind::Node => {
                let child = self.load(slot.offset)?;
                let (child, inserted) = self.insert_into(child, hash, key, value, depth + 1)?;
                (Slot::node(self.write(child)?), inserted)
            }
            SlotKind::Leaf => {
                let head = self.load_leaf(slot.offset)?;
                if head.hash == hash {
                    let (offset, inserted) = self.upsert_chain(slot.offset, head, key, value)?;
                    (Slot::leaf(offset), inserted)
                } else {
                    let mut child = MapNode::empty(self.fanout);
                    child.slots[self.index(head.hash, depth + 1)?] = slot;
                    child.count = self.chain_len(head)?;
                    let (child, _) = self.insert_into(child, hash, key, value, depth + 1)?;
                    (Slot::node(self.write(child)?), true)
                }
            }
        };

        node.slots[at] = slot;
        if inserted {
            node.count += 1;
        }
        Ok((node, inserted))
    }

    fn chain_len(&self, head: KvLeaf) -> Result<u64> {
        let mut len = 1;
        let mut next = head.next;
        while let Some(offset) = next {
            next = self.load_leaf(offset)?.next;
            len += 1;
        }
        Ok(len)
    }

    /// Replaces `key` inside the chain starting at `head_offset`, or prepends
    /// it. Entries after a replaced one are shared, entries before it are
    /// rewritten to point at the replacement.
    fn upsert_chain(
        &self,
        head_offset: Offset,
        head: KvLeaf,
        key: &[u8],
        value: &[u8],
    ) -> Result<(Offset, bool)> {
        let hash = head.hash;
        let mut before = Vec::new();
        let mut current = head;

        loop {
            if current.key == key {
                let replacement = KvLeaf {
                    hash,
                    next: current.next,
                    key: key.to_vec(),
                    value: value.to_vec(),
                };
                let offset = self.relink(before, self.write_leaf(replacement)?)?;
                return Ok((offset, false));
            }
            match current.next {
                Some(next) => {
                    let following = self.load_leaf(next)?;
                    before.push(current);
                    current = following;
                }
                None => break,
            }
        }

        let leaf = KvLeaf {
            hash,
            next: Some(head_offset),
            key: key.to_vec(),
            value: value.to_vec(),
        };
        Ok((self.write_leaf(leaf)?, true))
    }

    /// Rewrites `prefix` (in chain order) so its last entry links to `tail`,
    /// returning the new head.
    fn relink(&self, prefix: Vec<KvLeaf>, tail: Offset) -> Result<Offset> {
        self.relink_opt(prefix, Some(tail))
            .map(|head| head.unwrap_or(tail))
    }

    fn relink_opt(&self, prefix: Vec<KvLeaf>, tail: Option<Offset>) -> Result<Option<Offset>> {
        let mut next = tail;
        for mut leaf in prefix.into_iter().rev() {
            leaf.next = next;
            next = Some(self.write_leaf(leaf)?);
        }
        Ok(next)
    }

    /// Removes `key`. Returns the new root (`None` once the map is empty)
    /// and whether anything was removed. An absent key writes nothing and
    /// returns the old root.
    pub fn delete(&self, root: Option<Offset>, key: &[u8]) -> Result<(Option<Offset>, bool)> {
        self.delete_hashed(root, self.hash(key), key)
    }

    pub(crate) fn delete_hashed(
        &self,
        root: Option<Offset>,
        hash: u64,
        key: &[u8],
    ) -> Result<(Option<Offset>, bool)> {
        let Some(offset) = root else {
            return Ok((None, false));
        };

        let node = self.load(offset)?;
        match self.remove_from(node, hash, key, 0)? {
            None => Ok((root, false)),
            Some(node) if node.count == 0 => Ok((None, true)),
            Some(node) => Ok((Some(self.write(node)?), true)),
        }
    }

    /// Returns the node with `key` removed, or `None` if it was absent.
    fn remove_from(
        &self,
        mut node: MapNode,
        hash: u64,
        key: &[u8],
        depth: u32,
    ) -> Result<Option<MapNode>> {
        let at = self.index(hash, depth)?;
        let slot = node.slots[at];

        let replacement = match slot.kind {
            SlotKind::Empty => return Ok(None),
            SlotKind::Leaf => match self.remove_from_chain(slot.offset, hash, key)? {
                None => return Ok(None),
                Some(Some(head)) => Slot::leaf(head),
                Some(None) => Slot::EMPTY,
            },
            SlotKind::Node => {
                let child = self.load(slot.offset)?;
                match self.remove_from(child, hash, key, depth + 1)? {
                    None => return Ok(None),
                    Some(child) => self.fold(child)?,
                }
            }
        };

        node.slots[at] = replacement;
        node.count -= 1;
        Ok(Some(node))
    }

    /// Decides what the parent slot of a shrunken child becomes.
    fn fold(&self, child: MapNode) -> Result<Slot> {
        let mut live = child.slots.iter().filter(|slot| !slot.is_empty());
        let first = live.next().copied();
        let more = live.next().is_some();

        match first {
            None => Ok(Slot::EMPTY),
            Some(slot)
                if !more && slot.kind == SlotKind::Leaf && self.collapse_threshold >= 1 =>
            {
                Ok(slot)
            }
            Some(_) => Ok(Slot::node(self.write(child)?)),
        }
    }

    /// `None` if `key` is not in the chain, otherwise the new chain head
    /// (`Some(None)` when the chain became empty).
    fn remove_from_chain(
        &self,
        head: Offset,
        hash: u64,
        key: &[u8],
    ) -> Result<Option<Option<Offset>>> {
        let mut before = Vec::new();
        let mut next = Some(head);

        while let Some(offset) = next {
            let leaf = self.load_leaf(offset)?;
            if leaf.hash != hash {
                return Ok(None);
            }
            if leaf.key == key {
                return self.relink_opt(before, leaf.next).map(Some);
            }
            next = leaf.next;
            before.push(leaf);
        }
        Ok(None)
    }

    pub fn iter(&self, root: Option<Offset>) -> MapIter<'a> {
        MapIter::new(*self, root)
    }

    pub fn keys(&self, root: Option<Offset>) -> KeyIter<'a> {
        KeyIter::new(self.iter(root))
    }
}
