//! # Store
//!
//! `Store` is the handle applications hold. It is a cheap `Clone` around an
//! `Arc`, and every clone shares one backing store, one current header and
//! one writer flag.
//!
//! ## Open Sequence
//!
//! ```text
//! in_memory?  ── yes ──> MemoryStore + fresh header region
//!     │
//!     no
//!     │
//! file exists and non-empty? ── no ──> create_if_missing? ── no ──> NotFound
//!     │                                      │
//!     yes                                   yes: write fresh header region
//!     │
//! FileHeader::read (newest valid slot whose committed length fits)
//!     │
//! requested B == header B ? else FormatError
//!     │
//! len > committed_len ? log trailing uncommitted bytes (left in place)
//! ```
//!
//! Trailing bytes past the committed length are what an aborted or crashed
//! transaction leaves behind. They are unreachable from any version and the
//! next append simply follows them.
//!
//! ## Publishing
//!
//! The header lives behind a `RwLock`. A commit writes and syncs the new
//! header slot first and only then takes the write lock to swap the
//! in-memory copy, so readers never wait on an fsync. A reader that pins the
//! latest version sees either the old version or the fully published new
//! one. The branching factor, hash function and collapse threshold never
//! change after open and are kept outside the lock.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::{bail, ensure, Result, WrapErr};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::builder::{Durability, StoreBuilder};
use super::transaction::{ReadTxn, WriteTxn, WriterGuard};
use crate::config::{DEFAULT_HASH_VERSION, HEADER_REGION_SIZE};
use crate::error::StoreError;
use crate::hash::KeyHasher;
use crate::history::{self, History, VersionRecord};
use crate::storage::{BackingStore, FileHeader, FileStore, MemoryStore};
use crate::Offset;

#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
pub(crate) struct StoreInner {
    backend: Arc<dyn BackingStore>,
    header: RwLock<FileHeader>,
    fanout: usize,
    collapse_threshold: u8,
    hasher: KeyHasher,
    durability: Durability,
    path: Option<PathBuf>,
    writer_active: AtomicBool,
}

/// Summary of a store's configuration and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub path: Option<PathBuf>,
    pub branching_factor: u16,
    pub hash_version: u16,
    pub collapse_threshold: u8,
    pub version_count: u64,
    pub latest_version: Option<Offset>,
    pub committed_len: u64,
    pub file_len: u64,
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Opens the store at `path`, creating it with default settings if it
    /// does not exist.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        StoreBuilder::new().path(path).open()
    }

    pub fn in_memory() -> Result<Self> {
        StoreBuilder::new().in_memory().open()
    }

    pub(crate) fn open_with(builder: StoreBuilder) -> Result<Self> {
        let (backend, path): (Arc<dyn BackingStore>, Option<PathBuf>) = match builder.target() {
            Some(path) => {
                let exists = path.exists();
                if !exists && !builder.creates_missing() {
                    bail!(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("store file '{}' does not exist", path.display()),
                    ));
                }
                let file = FileStore::open(path, builder.creates_missing())?;
                (Arc::new(file), Some(path.to_path_buf()))
            }
            None if builder.is_in_memory() => (Arc::new(MemoryStore::new()), None),
            None => bail!("a store needs either a path or in_memory()"),
        };

        Self::with_backend(backend, path, &builder)
    }

    fn with_backend(
        backend: Arc<dyn BackingStore>,
        path: Option<PathBuf>,
        builder: &StoreBuilder,
    ) -> Result<Self> {
        let header = if backend.is_empty() {
            Self::initialize(backend.as_ref(), builder)?
        } else {
            Self::load_header(backend.as_ref(), builder)?
        };

        let hasher = KeyHasher::for_version(header.hash_version).ok_or_else(|| {
            StoreError::format(format!("unknown hash version {}", header.hash_version))
        })?;

        info!(
            path = ?path,
            branching_factor = header.branching_factor,
            hash_version = hasher.version(),
            latest_version = ?header.latest_version,
            versions = header.version_count,
            "opened store"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                backend,
                header: RwLock::new(header),
                fanout: header.branching_factor as usize,
                collapse_threshold: header.collapse_threshold,
                hasher,
                durability: builder.durability_mode(),
                path,
                writer_active: AtomicBool::new(false),
            }),
        })
    }

    fn initialize(backend: &dyn BackingStore, builder: &StoreBuilder) -> Result<FileHeader> {
        let (branching_factor, collapse_threshold) = builder.creation_params()?;
        let header = FileHeader::new(branching_factor, DEFAULT_HASH_VERSION, collapse_threshold);

        let offset = backend
            .append(&header.initial_region())
            .wrap_err("failed to write initial header region")?;
        ensure!(
            offset == 0,
            StoreError::format(format!("header region landed at offset {}", offset))
        );
        backend.flush()?;

        debug!(branching_factor, collapse_threshold, "created new store");
        Ok(header)
    }

    fn load_header(backend: &dyn BackingStore, builder: &StoreBuilder) -> Result<FileHeader> {
        let header = FileHeader::read(backend)?;

        if let Some(requested) = builder.requested_branching_factor() {
            if requested != header.branching_factor {
                bail!(StoreError::format(format!(
                    "store was created with branching factor {}, {} requested",
                    header.branching_factor, requested
                )));
            }
        }
        if let Some(requested) = builder.requested_collapse_threshold() {
            if requested != header.collapse_threshold {
                warn!(
                    requested,
                    stored = header.collapse_threshold,
                    "ignoring collapse threshold, the stored one applies"
                );
            }
        }

        let len = backend.len();
        if len > header.committed_len {
            warn!(
                committed_len = header.committed_len,
                file_len = len,
                trailing = len - header.committed_len,
                "store has uncommitted trailing bytes"
            );
        }

        Ok(header)
    }

    pub(crate) fn backend(&self) -> &dyn BackingStore {
        self.inner.backend.as_ref()
    }

    pub(crate) fn header(&self) -> FileHeader {
        *self.inner.header.read()
    }

    pub(crate) fn hasher(&self) -> KeyHasher {
        self.inner.hasher
    }

    pub(crate) fn fanout(&self) -> usize {
        self.inner.fanout
    }

    pub(crate) fn collapse_threshold(&self) -> u8 {
        self.inner.collapse_threshold
    }

    /// The currently published version, if any commit has happened.
    pub fn latest(&self) -> Result<Option<VersionRecord>> {
        history::latest(self.backend(), &self.header())
    }

    /// Pins the latest version for reading.
    pub fn begin_read(&self) -> Result<ReadTxn> {
        let version = self.latest()?;
        Ok(ReadTxn::new(self.clone(), version))
    }

    /// Pins the version recorded at `offset`.
    pub fn begin_read_at(&self, offset: Offset) -> Result<ReadTxn> {
        let committed_len = self.header().committed_len;
        if offset < HEADER_REGION_SIZE as Offset || offset >= committed_len {
            bail!(StoreError::format(format!(
                "offset {} is not a committed version (committed length {})",
                offset, committed_len
            )));
        }
        let version = history::read(self.backend(), offset)?;
        Ok(ReadTxn::new(self.clone(), Some(version)))
    }

    /// Starts the single write transaction. Fails with a concurrency error
    /// while another one is alive.
    pub fn begin_write(&self) -> Result<WriteTxn> {
        let guard = WriterGuard::acquire(self.clone())?;
        let base = self.latest()?;
        debug!(
            base_sequence = ?base.map(|v| v.sequence),
            "began write transaction"
        );
        Ok(WriteTxn::new(self.clone(), guard, base))
    }

    pub(crate) fn try_lock_writer(&self) -> Result<()> {
        if self
            .inner
            .writer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            bail!(StoreError::WriterActive);
        }
        Ok(())
    }

    pub(crate) fn unlock_writer(&self) {
        self.inner.writer_active.store(false, Ordering::Release);
    }

    /// Makes `version` the latest one: sync appended blocks, write the
    /// alternate header slot, sync again, then swap the in-memory header.
    ///
    /// Only the holder of the writer flag calls this, so the header cannot
    /// change between reading it here and the swap.
    pub(crate) fn publish(&self, version: &VersionRecord) -> Result<FileHeader> {
        let backend = self.backend();
        let sync = self.inner.durability == Durability::Full;

        if sync {
            backend
                .flush()
                .wrap_err("failed to sync blocks before header update")?;
        }

        let next = self.header().next(version.offset, backend.len());
        next.write(backend)
            .wrap_err_with(|| format!("failed to write header slot {}", next.slot_index()))?;
        if sync {
            backend.flush().wrap_err("failed to sync header update")?;
        }
        *self.inner.header.write() = next;

        Ok(next)
    }

    /// Versions from the latest back to the first, most recent first.
    pub fn history(&self) -> History {
        History::new(self.inner.backend.clone(), self.header().latest_version)
    }

    pub fn info(&self) -> StoreInfo {
        let header = self.header();
        StoreInfo {
            path: self.inner.path.clone(),
            branching_factor: header.branching_factor,
            hash_version: header.hash_version,
            collapse_threshold: header.collapse_threshold,
            version_count: header.version_count,
            latest_version: header.latest_version,
            committed_len: header.committed_len,
            file_len: self.backend().len(),
        }
    }
}
