//! # Persistent Array Tree
//!
//! A fixed-fanout tree of [`ArrayNode`]s. Every operation takes a root offset
//! and returns a new root offset; nothing reachable from the old root is ever
//! modified, so every earlier root stays a complete, readable array.
//!
//! ## Shape
//!
//! Elements are packed from the left. A node of height `h` covers
//! `B^(h+1)` element positions and each of its slots covers `B^h`:
//!
//! ```text
//! height 1            [ n0 | n1 | -- | -- ]        B = 4, len = 6
//!                      /     \
//! height 0   [ v0 v1 v2 v3 ] [ v4 v5 -- -- ]
//! ```
//!
//! ## Copy-on-Write Paths
//!
//! `set` and `append` rewrite exactly one node per level along the path to
//! the touched position plus the new leaf; every other slot is copied by
//! offset. `append` on a full tree (`len == B^(height+1)`) first wraps the old
//! root as slot 0 of a new root one level taller, which is the only way the
//! tree grows. `truncate` walks the leftmost spine down while the remaining
//! elements fit in slot 0, then rewrites the right edge.
//!
//! ## Lengths
//!
//! Each node stores the number of elements beneath it, so `len` is a single
//! node read.

use eyre::{bail, Result};

use super::iter::ArrayIter;
use crate::encoding::{ArrayNode, Block, Slot, SlotKind};
use crate::error::StoreError;
use crate::storage::blocks::{append_block, read_array_node, read_leaf};
use crate::storage::BackingStore;
use crate::Offset;

#[derive(Debug, Clone, Copy)]
pub struct ArrayTree<'a> {
    store: &'a dyn BackingStore,
    fanout: usize,
}

impl<'a> ArrayTree<'a> {
    pub fn new(store: &'a dyn BackingStore, fanout: usize) -> Self {
        Self { store, fanout }
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Number of element positions one slot of a height-`height` node covers.
    fn span(&self, height: u8) -> u64 {
        (self.fanout as u64)
            .checked_pow(height as u32)
            .unwrap_or(u64::MAX)
    }

    /// Number of element positions a height-`height` node covers.
    fn capacity(&self, height: u8) -> u64 {
        (self.fanout as u64)
            .checked_pow(height as u32 + 1)
            .unwrap_or(u64::MAX)
    }

    fn slot_for(&self, index: u64, height: u8) -> usize {
        ((index / self.span(height)) % self.fanout as u64) as usize
    }

    pub(crate) fn load(&self, offset: Offset) -> Result<ArrayNode> {
        let node = read_array_node(self.store, offset)?;
        if node.slots.len() != self.fanout {
            bail!(StoreError::format(format!(
                "array node at offset {} has {} slots, store branching factor is {}",
                offset,
                node.slots.len(),
                self.fanout
            )));
        }
        Ok(node)
    }

    pub(crate) fn load_leaf(&self, offset: Offset) -> Result<Vec<u8>> {
        read_leaf(self.store, offset)
    }

    fn write(&self, node: ArrayNode) -> Result<Offset> {
        append_block(self.store, &Block::Array(node))
    }

    fn write_leaf(&self, value: &[u8]) -> Result<Offset> {
        append_block(self.store, &Block::Leaf(value.to_vec()))
    }

    pub fn len(&self, root: Option<Offset>) -> Result<u64> {
        match root {
            Some(offset) => Ok(self.load(offset)?.count),
            None => Ok(0),
        }
    }

    pub fn get(&self, root: Option<Offset>, index: u64) -> Result<Option<Vec<u8>>> {
        let Some(root) = root else {
            return Ok(None);
        };
        let mut node = self.load(root)?;
        if index >= node.count {
            return Ok(None);
        }

        loop {
            let slot = node.slots[self.slot_for(index, node.height)];
            match (node.height, slot.kind) {
                (0, SlotKind::Leaf) => return self.load_leaf(slot.offset).map(Some),
                (h, SlotKind::Node) if h > 0 => node = self.load(slot.offset)?,
                (h, kind) => bail!(StoreError::format(format!(
                    "array index {} reached a {:?} slot at height {}",
                    index, kind, h
                ))),
            }
        }
    }

    pub fn append(&self, root: Option<Offset>, value: &[u8]) -> Result<Offset> {
        let leaf = self.write_leaf(value)?;

        let Some(root) = root else {
            let mut node = ArrayNode::empty(0, self.fanout);
            node.slots[0] = Slot::leaf(leaf);
            node.count = 1;
            return self.write(node);
        };

        let mut node = self.load(root)?;
        if node.count >= self.capacity(node.height) {
            let height = node.height.checked_add(1).ok_or_else(|| {
                StoreError::format("array tree height overflow")
            })?;
            let mut grown = ArrayNode::empty(height, self.fanout);
            grown.slots[0] = Slot::node(root);
            grown.count = node.count;
            node = grown;
        }

        let index = node.count;
        let node = self.append_into(node, index, leaf)?;
        self.write(node)
    }

    fn append_into(&self, mut node: ArrayNode, index: u64, leaf: Offset) -> Result<ArrayNode> {
        let at = self.slot_for(index, node.height);

        if node.height == 0 {
            node.slots[at] = Slot::leaf(leaf);
        } else {
            let slot = node.slots[at];
            let child = match slot.kind {
                SlotKind::Empty => ArrayNode::empty(node.height - 1, self.fanout),
                SlotKind::Node => self.load(slot.offset)?,
                SlotKind::Leaf => bail!(StoreError::format(format!(
                    "leaf slot inside array node of height {}",
                    node.height
                ))),
            };
            let child = self.append_into(child, index, leaf)?;
            node.slots[at] = Slot::node(self.write(child)?);
        }

        node.count += 1;
        Ok(node)
    }

    pub fn set(&self, root: Option<Offset>, index: u64, value: &[u8]) -> Result<Offset> {
        let len = self.len(root)?;
        let Some(root) = root.filter(|_| index < len) else {
            bail!(StoreError::IndexOutOfRange { index, len });
        };

        let leaf = self.write_leaf(value)?;
        self.set_in(root, index, leaf)
    }

    fn set_in(&self, offset: Offset, index: u64, leaf: Offset) -> Result<Offset> {
        let mut node = self.load(offset)?;
        let at = self.slot_for(index, node.height);
        let slot = node.slots[at];

        node.slots[at] = match (node.height, slot.kind) {
            (0, SlotKind::Leaf) => Slot::leaf(leaf),
            (h, SlotKind::Node) if h > 0 => Slot::node(self.set_in(slot.offset, index, leaf)?),
            (h, kind) => bail!(StoreError::format(format!(
                "array index {} reached a {:?} slot at height {}",
                index, kind, h
            ))),
        };

        self.write(node)
    }

    /// Keeps the first `new_len` elements.
    pub fn truncate(&self, root: Option<Offset>, new_len: u64) -> Result<Option<Offset>> {
        let len = self.len(root)?;
        if new_len > len {
            bail!(StoreError::IndexOutOfRange {
                index: new_len,
                len
            });
        }
        let Some(mut offset) = root else {
            return Ok(None);
        };
        if new_len == len {
            return Ok(Some(offset));
        }
        if new_len == 0 {
            return Ok(None);
        }

        let mut node = self.load(offset)?;
        while node.height > 0 && new_len <= self.span(node.height) {
            let first = node.slots[0];
            if first.kind != SlotKind::Node {
                bail!(StoreError::format(format!(
                    "array node at offset {} has no first child",
                    offset
                )));
            }
            offset = first.offset;
            node = self.load(offset)?;
        }

        if node.count == new_len {
            return Ok(Some(offset));
        }
        let node = self.truncate_node(node, new_len)?;
        self.write(node).map(Some)
    }

    fn truncate_node(&self, mut node: ArrayNode, keep: u64) -> Result<ArrayNode> {
        let span = self.span(node.height);
        let last = ((keep - 1) / span) as usize;

        for slot in node.slots.iter_mut().skip(last + 1) {
            *slot = Slot::EMPTY;
        }

        if node.height > 0 {
            let slot = node.slots[last];
            if slot.kind != SlotKind::Node {
                bail!(StoreError::format(format!(
                    "array node of height {} missing child {}",
                    node.height, last
                )));
            }
            let remainder = keep - last as u64 * span;
            let child = self.load(slot.offset)?;
            if child.count != remainder {
                let child = self.truncate_node(child, remainder)?;
                node.slots[last] = Slot::node(self.write(child)?);
            }
        }

        node.count = keep;
        Ok(node)
    }

    pub fn iter(&self, root: Option<Offset>) -> ArrayIter<'a> {
        ArrayIter::new(*self, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HEADER_REGION_SIZE;
    use crate::error::{error_kind, ErrorKind};
    use crate::storage::MemoryStore;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.append(&[0u8; HEADER_REGION_SIZE]).unwrap();
        store
    }

    fn build(tree: &ArrayTree<'_>, n: u64) -> Option<Offset> {
        let mut root = None;
        for i in 0..n {
            root = Some(tree.append(root, format!("v{}", i).as_bytes()).unwrap());
        }
        root
    }

    #[test]
    fn empty_root_has_nothing() {
        let store = store();
        let tree = ArrayTree::new(&store, 4);

        assert_eq!(tree.len(None).unwrap(), 0);
        assert_eq!(tree.get(None, 0).unwrap(), None);
    }

    #[test]
    fn append_reads_back_in_order_across_growth() {
        let store = store();
        let tree = ArrayTree::new(&store, 4);

        for n in [1u64, 4, 5, 16, 17, 64, 65] {
            let root = build(&tree, n);
            assert_eq!(tree.len(root).unwrap(), n);
            for i in 0..n {
                assert_eq!(
                    tree.get(root, i).unwrap(),
                    Some(format!("v{}", i).into_bytes()),
                    "n={} i={}",
                    n,
                    i
                );
            }
            assert_eq!(tree.get(root, n).unwrap(), None);
        }
    }

    #[test]
    fn height_grows_only_when_full() {
        let store = store();
        let tree = ArrayTree::new(&store, 4);

        let root = build(&tree, 4).unwrap();
        assert_eq!(tree.load(root).unwrap().height, 0);

        let root = tree.append(Some(root), b"x").unwrap();
        let node = tree.load(root).unwrap();
        assert_eq!(node.height, 1);
        assert_eq!(node.count, 5);
    }

    #[test]
    fn set_leaves_old_root_intact() {
        let store = store();
        let tree = ArrayTree::new(&store, 4);
        let old = build(&tree, 10);

        let new = tree.set(old, 6, b"changed").unwrap();

        assert_eq!(tree.get(Some(new), 6).unwrap(), Some(b"changed".to_vec()));
        assert_eq!(tree.get(old, 6).unwrap(), Some(b"v6".to_vec()));
        assert_eq!(tree.len(Some(new)).unwrap(), 10);
    }

    #[test]
    fn set_shares_untouched_siblings() {
        let store = store();
        let tree = ArrayTree::new(&store, 4);
        let old = build(&tree, 16).unwrap();

        let new = tree.set(Some(old), 0, b"first").unwrap();

        let old_root = tree.load(old).unwrap();
        let new_root = tree.load(new).unwrap();
        assert_ne!(old_root.slots[0], new_root.slots[0]);
        assert_eq!(old_root.slots[1..], new_root.slots[1..]);
    }

    #[test]
    fn set_out_of_range_is_index_error() {
        let store = store();
        let tree = ArrayTree::new(&store, 4);
        let root = build(&tree, 3);

        let err = tree.set(root, 3, b"nope").unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Index));
        let err = tree.set(None, 0, b"nope").unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Index));
    }

    #[test]
    fn truncate_shrinks_and_lowers_height() {
        let store = store();
        let tree = ArrayTree::new(&store, 4);
        let root = build(&tree, 21);

        for keep in [21u64, 20, 16, 13, 5, 4, 1] {
            let cut = tree.truncate(root, keep).unwrap();
            assert_eq!(tree.len(cut).unwrap(), keep);
            for i in 0..keep {
                assert_eq!(tree.get(cut, i).unwrap(), Some(format!("v{}", i).into_bytes()));
            }
            assert_eq!(tree.get(cut, keep).unwrap(), None);
        }

        let small = tree.truncate(root, 4).unwrap();
        assert_eq!(tree.load(small.unwrap()).unwrap().height, 0);
        assert_eq!(tree.truncate(root, 0).unwrap(), None);
        assert_eq!(tree.len(root).unwrap(), 21);
    }

    #[test]
    fn append_after_truncate_continues() {
        let store = store();
        let tree = ArrayTree::new(&store, 4);
        let root = build(&tree, 18);

        let cut = tree.truncate(root, 6).unwrap();
        let next = tree.append(cut, b"again").unwrap();

        assert_eq!(tree.len(Some(next)).unwrap(), 7);
        assert_eq!(tree.get(Some(next), 6).unwrap(), Some(b"again".to_vec()));
        assert_eq!(tree.get(Some(next), 5).unwrap(), Some(b"v5".to_vec()));
    }

    #[test]
    fn truncate_past_end_is_index_error() {
        let store = store();
        let tree = ArrayTree::new(&store, 4);
        let root = build(&tree, 2);

        let err = tree.truncate(root, 3).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Index));
    }

    #[test]
    fn mismatched_fanout_is_format_error() {
        let store = store();
        let root = build(&ArrayTree::new(&store, 4), 3);

        let err = ArrayTree::new(&store, 8).get(root, 0).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Format));
    }
}
