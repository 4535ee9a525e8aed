//! Lazy in-order traversal of a persistent array.
//!
//! The iterator owns its own path stack, so any number of traversals over the
//! same root can run side by side. Nodes are read on demand; a traversal of a
//! tree of height `h` holds at most `h + 1` nodes.

use eyre::Result;
use smallvec::SmallVec;

use super::ArrayTree;
use crate::encoding::{ArrayNode, SlotKind};
use crate::error::StoreError;
use crate::Offset;

pub struct ArrayIter<'a> {
    tree: ArrayTree<'a>,
    root: Option<Offset>,
    stack: SmallVec<[(ArrayNode, usize); 8]>,
    started: bool,
}

enum Step {
    Pop,
    Leaf(Offset),
    Descend(Offset),
    Corrupt(u8, SlotKind),
}

impl<'a> ArrayIter<'a> {
    pub(crate) fn new(tree: ArrayTree<'a>, root: Option<Offset>) -> Self {
        Self {
            tree,
            root,
            stack: SmallVec::new(),
            started: false,
        }
    }

    fn fail(&mut self, err: eyre::Report) -> Option<Result<Vec<u8>>> {
        self.stack.clear();
        Some(Err(err))
    }

    fn corrupt(height: u8, kind: SlotKind) -> eyre::Report {
        StoreError::format(format!(
            "array traversal reached a {:?} slot at height {}",
            kind, height
        ))
        .into()
    }
}

impl Iterator for ArrayIter<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            if let Some(root) = self.root {
                match self.tree.load(root) {
                    Ok(node) => self.stack.push((node, 0)),
                    Err(e) => return self.fail(e),
                }
            }
        }

        loop {
            let step = {
                let (node, pos) = self.stack.last_mut()?;
                match node.slots.get(*pos).copied() {
                    None => Step::Pop,
                    Some(slot) => {
                        *pos += 1;
                        match (node.height, slot.kind) {
                            // Elements are packed from the left.
                            (_, SlotKind::Empty) => Step::Pop,
                            (0, SlotKind::Leaf) => Step::Leaf(slot.offset),
                            (h, SlotKind::Node) if h > 0 => Step::Descend(slot.offset),
                            (h, kind) => Step::Corrupt(h, kind),
                        }
                    }
                }
            };

            match step {
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Leaf(offset) => {
                    return match self.tree.load_leaf(offset) {
                        Ok(value) => Some(Ok(value)),
                        Err(e) => self.fail(e),
                    };
                }
                Step::Descend(offset) => match self.tree.load(offset) {
                    Ok(child) => self.stack.push((child, 0)),
                    Err(e) => return self.fail(e),
                },
                Step::Corrupt(height, kind) => {
                    let err = Self::corrupt(height, kind);
                    return self.fail(err);
                }
            }
        }
    }
}

/// Collects every value, stopping at the first error.
pub fn collect_values(iter: ArrayIter<'_>) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    for value in iter {
        out.push(value?);
    }
    Ok(out)
}
