//! Lazy pre-order traversal of a map trie.
//!
//! Entries come out in slot order at each level, with the entries of an
//! overflow chain in chain order. The order depends only on the hashes, so
//! it is deterministic for a given set of keys but carries no meaning.

use eyre::Result;
use smallvec::SmallVec;

use super::HashTrie;
use crate::encoding::{MapNode, SlotKind};
use crate::Offset;

type Entry = (Vec<u8>, Vec<u8>);

pub struct MapIter<'a> {
    trie: HashTrie<'a>,
    root: Option<Offset>,
    stack: SmallVec<[(MapNode, usize); 8]>,
    chain: Option<Offset>,
    started: bool,
}

impl<'a> MapIter<'a> {
    pub(crate) fn new(trie: HashTrie<'a>, root: Option<Offset>) -> Self {
        Self {
            trie,
            root,
            stack: SmallVec::new(),
            chain: None,
            started: false,
        }
    }

    fn fail(&mut self, err: eyre::Report) -> Option<Result<Entry>> {
        self.stack.clear();
        self.chain = None;
        Some(Err(err))
    }
}

impl Iterator for MapIter<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            if let Some(root) = self.root {
                match self.trie.load(root) {
                    Ok(node) => self.stack.push((node, 0)),
                    Err(e) => return self.fail(e),
                }
            }
        }

        loop {
            if let Some(offset) = self.chain.take() {
                return match self.trie.load_leaf(offset) {
                    Ok(leaf) => {
                        self.chain = leaf.next;
                        Some(Ok((leaf.key, leaf.value)))
                    }
                    Err(e) => self.fail(e),
                };
            }

            let slot = {
                let (node, pos) = self.stack.last_mut()?;
                let slot = node.slots.get(*pos).copied();
                *pos += 1;
                slot
            };

            match slot {
                None => {
                    self.stack.pop();
                }
                Some(slot) => match slot.kind {
                    SlotKind::Empty => {}
                    SlotKind::Leaf => self.chain = Some(slot.offset),
                    SlotKind::Node => match self.trie.load(slot.offset) {
                        Ok(child) => self.stack.push((child, 0)),
                        Err(e) => return self.fail(e),
                    },
                },
            }
        }
    }
}

/// Keys of a trie whose entries carry no value, in the same order as
/// [`MapIter`].
pub struct KeyIter<'a> {
    entries: MapIter<'a>,
}

impl<'a> KeyIter<'a> {
    pub(crate) fn new(entries: MapIter<'a>) -> Self {
        Self { entries }
    }
}

impl Iterator for KeyIter<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|entry| entry.map(|(key, _)| key))
    }
}
