//! # Transactions
//!
//! ## Read Transactions
//!
//! A `ReadTxn` pins one version. Everything reachable from that version's
//! root is immutable, so a read transaction holds no lock and never needs
//! to be closed; dropping it is a no-op.
//!
//! ## Write Transactions
//!
//! ```text
//! begin_write()          WriterGuard acquired (AtomicBool false -> true)
//!   array()/map()/set()  nodes appended immediately, working root updated
//! commit()               flush, append Version, flush, write header slot, flush
//!   or abort()/drop      nothing published, appended bytes become garbage
//! WriterGuard dropped    AtomicBool true -> false
//! ```
//!
//! The working root is private to the transaction until commit, so other
//! threads keep reading the previously published version while it runs.
//!
//! ## Root Kind
//!
//! A store holds one collection at its root: an array, a map or a set. The
//! first transaction that mutates a collection fixes its kind; later requests
//! for another kind fail with a kind-mismatch error, even after the
//! collection is emptied.

use std::time::{SystemTime, UNIX_EPOCH};

use eyre::{bail, Result, WrapErr};
use tracing::debug;

use super::Store;
use crate::array::{ArrayIter, ArrayTree};
use crate::encoding::RootKind;
use crate::error::StoreError;
use crate::hamt::{HashTrie, KeyIter, MapIter};
use crate::history::{self, VersionRecord};
use crate::Offset;

fn check_kind(current: RootKind, wanted: RootKind) -> Result<()> {
    if current != RootKind::Empty && current != wanted {
        bail!(StoreError::KindMismatch {
            expected: wanted.name(),
            found: current.name(),
        });
    }
    Ok(())
}

/// A pinned, read-only view of one version.
#[derive(Debug, Clone)]
pub struct ReadTxn {
    store: Store,
    version: Option<VersionRecord>,
}

impl ReadTxn {
    pub(crate) fn new(store: Store, version: Option<VersionRecord>) -> Self {
        Self { store, version }
    }

    /// The pinned version, `None` for a store with no commits.
    pub fn version(&self) -> Option<&VersionRecord> {
        self.version.as_ref()
    }

    pub fn root_kind(&self) -> RootKind {
        self.version.map_or(RootKind::Empty, |v| v.root_kind)
    }

    fn root(&self) -> Option<Offset> {
        self.version.and_then(|v| v.root)
    }

    pub fn array(&self) -> Result<ArrayReader<'_>> {
        check_kind(self.root_kind(), RootKind::Array)?;
        Ok(ArrayReader {
            tree: ArrayTree::new(self.store.backend(), self.store.fanout()),
            root: self.root(),
        })
    }

    pub fn map(&self) -> Result<MapReader<'_>> {
        check_kind(self.root_kind(), RootKind::Map)?;
        Ok(MapReader {
            trie: trie_for(&self.store),
            root: self.root(),
        })
    }

    pub fn set(&self) -> Result<SetReader<'_>> {
        check_kind(self.root_kind(), RootKind::Set)?;
        Ok(SetReader {
            trie: trie_for(&self.store),
            root: self.root(),
        })
    }
}

fn trie_for(store: &Store) -> HashTrie<'_> {
    HashTrie::new(
        store.backend(),
        store.fanout(),
        store.hasher(),
        store.collapse_threshold(),
    )
}

#[derive(Debug, Clone, Copy)]
pub struct ArrayReader<'a> {
    tree: ArrayTree<'a>,
    root: Option<Offset>,
}

impl<'a> ArrayReader<'a> {
    pub fn len(&self) -> Result<u64> {
        self.tree.len(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn get(&self, index: u64) -> Result<Option<Vec<u8>>> {
        self.tree.get(self.root, index)
    }

    pub fn iter(&self) -> ArrayIter<'a> {
        self.tree.iter(self.root)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MapReader<'a> {
    trie: HashTrie<'a>,
    root: Option<Offset>,
}

impl<'a> MapReader<'a> {
    pub fn len(&self) -> Result<u64> {
        self.trie.len(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.trie.get(self.root, key)
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        self.trie.contains_key(self.root, key)
    }

    pub fn iter(&self) -> MapIter<'a> {
        self.trie.iter(self.root)
    }
}

/// Read access to a set of byte-string members.
#[derive(Debug, Clone, Copy)]
pub struct SetReader<'a> {
    trie: HashTrie<'a>,
    root: Option<Offset>,
}

impl<'a> SetReader<'a> {
    pub fn len(&self) -> Result<u64> {
        self.trie.len(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn contains(&self, member: &[u8]) -> Result<bool> {
        self.trie.contains_key(self.root, member)
    }

    pub fn iter(&self) -> KeyIter<'a> {
        self.trie.keys(self.root)
    }
}

/// Holds the store's single-writer flag for the life of a write transaction.
#[derive(Debug)]
pub(crate) struct WriterGuard {
    store: Store,
}

impl WriterGuard {
    pub(crate) fn acquire(store: Store) -> Result<Self> {
        store
            .try_lock_writer()
            .wrap_err("failed to begin write transaction")?;
        Ok(Self { store })
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        self.store.unlock_writer();
    }
}

/// Root state a write transaction is building.
#[derive(Debug, Clone, Copy)]
struct Working {
    root_kind: RootKind,
    root: Option<Offset>,
    size: u64,
}

#[derive(Debug)]
pub struct WriteTxn {
    store: Store,
    base: Option<VersionRecord>,
    working: Working,
    start_len: u64,
    finished: bool,
    _guard: WriterGuard,
}

impl WriteTxn {
    pub(crate) fn new(store: Store, guard: WriterGuard, base: Option<VersionRecord>) -> Self {
        let working = Working {
            root_kind: base.map_or(RootKind::Empty, |v| v.root_kind),
            root: base.and_then(|v| v.root),
            size: base.map_or(0, |v| v.size),
        };
        let start_len = store.backend().len();
        Self {
            store,
            base,
            working,
            start_len,
            finished: false,
            _guard: guard,
        }
    }

    /// The version this transaction started from.
    pub fn base(&self) -> Option<&VersionRecord> {
        self.base.as_ref()
    }

    pub fn root_kind(&self) -> RootKind {
        self.working.root_kind
    }

    pub fn array(&mut self) -> Result<ArrayWriter<'_>> {
        check_kind(self.working.root_kind, RootKind::Array)?;
        let tree = ArrayTree::new(self.store.backend(), self.store.fanout());
        Ok(ArrayWriter {
            tree,
            working: &mut self.working,
        })
    }

    pub fn map(&mut self) -> Result<MapWriter<'_>> {
        check_kind(self.working.root_kind, RootKind::Map)?;
        let trie = trie_for(&self.store);
        Ok(MapWriter {
            trie,
            working: &mut self.working,
        })
    }

    pub fn set(&mut self) -> Result<SetWriter<'_>> {
        check_kind(self.working.root_kind, RootKind::Set)?;
        let trie = trie_for(&self.store);
        Ok(SetWriter {
            trie,
            working: &mut self.working,
        })
    }

    /// Appends the version record and publishes it through the header.
    pub fn commit(mut self) -> Result<VersionRecord> {
        let backend = self.store.backend();
        let version = history::commit(
            backend,
            self.base.as_ref(),
            self.working.root_kind,
            self.working.root,
            self.working.size,
            now_ms(),
        )?;
        let header = self
            .store
            .publish(&version)
            .wrap_err_with(|| format!("failed to publish version {}", version.sequence))?;
        self.finished = true;

        debug!(
            sequence = version.sequence,
            root = ?version.root,
            root_kind = version.root_kind.name(),
            appended = header.committed_len - self.start_len,
            "committed write transaction"
        );
        Ok(version)
    }

    /// Discards the transaction. Appended blocks stay in the file unreachable.
    pub fn abort(mut self) {
        self.finish_abort();
    }

    fn finish_abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        debug!(
            base_sequence = ?self.base.map(|v| v.sequence),
            abandoned = self.store.backend().len().saturating_sub(self.start_len),
            "aborted write transaction"
        );
    }
}

impl Drop for WriteTxn {
    fn drop(&mut self) {
        self.finish_abort();
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Mutable access to the array at the root of a write transaction.
#[derive(Debug)]
pub struct ArrayWriter<'a> {
    tree: ArrayTree<'a>,
    working: &'a mut Working,
}

impl ArrayWriter<'_> {
    fn update(&mut self, root: Option<Offset>) -> Result<()> {
        self.working.root_kind = RootKind::Array;
        self.working.size = self.tree.len(root)?;
        self.working.root = root;
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        self.tree.len(self.working.root)
    }

    pub fn is_empty(&self) -> bool {
        self.working.root.is_none()
    }

    pub fn get(&self, index: u64) -> Result<Option<Vec<u8>>> {
        self.tree.get(self.working.root, index)
    }

    /// Appends `value` and returns its index.
    pub fn push(&mut self, value: &[u8]) -> Result<u64> {
        let index = self.working.size;
        let root = self.tree.append(self.working.root, value)?;
        self.update(Some(root))?;
        Ok(index)
    }

    pub fn set(&mut self, index: u64, value: &[u8]) -> Result<()> {
        let root = self.tree.set(self.working.root, index, value)?;
        self.update(Some(root))
    }

    /// Drops trailing elements. Truncating to the current length is a no-op
    /// and does not fix the root kind.
    pub fn truncate(&mut self, new_len: u64) -> Result<()> {
        if new_len == self.working.size {
            return Ok(());
        }
        let root = self.tree.truncate(self.working.root, new_len)?;
        self.update(root)
    }

    pub fn iter(&self) -> ArrayIter<'_> {
        self.tree.iter(self.working.root)
    }
}

/// Mutable access to the map at the root of a write transaction.
#[derive(Debug)]
pub struct MapWriter<'a> {
    trie: HashTrie<'a>,
    working: &'a mut Working,
}

impl MapWriter<'_> {
    pub fn len(&self) -> Result<u64> {
        self.trie.len(self.working.root)
    }

    pub fn is_empty(&self) -> bool {
        self.working.root.is_none()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.trie.get(self.working.root, key)
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        self.trie.contains_key(self.working.root, key)
    }

    /// Inserts or replaces `key`. Returns true if the key was new.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        let (root, inserted) = self.trie.set(self.working.root, key, value)?;
        self.working.root_kind = RootKind::Map;
        self.working.root = Some(root);
        if inserted {
            self.working.size += 1;
        }
        Ok(inserted)
    }

    /// Removes `key`. Returns true if it was present.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let (root, removed) = self.trie.delete(self.working.root, key)?;
        if removed {
            self.working.root = root;
            self.working.size -= 1;
        }
        Ok(removed)
    }

    pub fn iter(&self) -> MapIter<'_> {
        self.trie.iter(self.working.root)
    }
}

/// Mutable access to the set at the root of a write transaction.
#[derive(Debug)]
pub struct SetWriter<'a> {
    trie: HashTrie<'a>,
    working: &'a mut Working,
}

impl SetWriter<'_> {
    pub fn len(&self) -> Result<u64> {
        self.trie.len(self.working.root)
    }

    pub fn is_empty(&self) -> bool {
        self.working.root.is_none()
    }

    pub fn contains(&self, member: &[u8]) -> Result<bool> {
        self.trie.contains_key(self.working.root, member)
    }

    /// Adds `member`. Returns true if it was new. A member that is already
    /// present writes nothing.
    pub fn insert(&mut self, member: &[u8]) -> Result<bool> {
        if self.contains(member)? {
            return Ok(false);
        }
        let (root, _) = self.trie.set(self.working.root, member, &[])?;
        self.working.root_kind = RootKind::Set;
        self.working.root = Some(root);
        self.working.size += 1;
        Ok(true)
    }

    /// Removes `member`. Returns true if it was present.
    pub fn remove(&mut self, member: &[u8]) -> Result<bool> {
        let (root, removed) = self.trie.delete(self.working.root, member)?;
        if removed {
            self.working.root = root;
            self.working.size -= 1;
        }
        Ok(removed)
    }

    pub fn iter(&self) -> KeyIter<'_> {
        self.trie.keys(self.working.root)
    }
}
