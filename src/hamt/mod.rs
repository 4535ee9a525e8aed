//! # Persistent Map
//!
//! A hash array mapped trie over byte-string keys and values.
//!
//! | Operation      | Reads                 | Writes                          |
//! |----------------|-----------------------|---------------------------------|
//! | `get`          | one node per level    | nothing                         |
//! | `set`          | one node per level    | one node per level, one leaf    |
//! | `delete`       | one node per level    | at most one node per level      |
//! | `len`          | root node             | nothing                         |
//!
//! Sets use the same trie with an empty value in every entry and iterate it
//! through [`KeyIter`].
//!
//! Full 64-bit hash collisions are resolved by chaining KV leaves, so the
//! trie never needs more than `ceil(64 / log2(B))` levels.

mod iter;
mod trie;

pub use iter::{KeyIter, MapIter};
pub use trie::HashTrie;
