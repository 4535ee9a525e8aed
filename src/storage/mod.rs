//! # Storage Module
//!
//! This module is the only I/O surface of cowdb. Everything above it deals in
//! [`Offset`]s and decoded blocks; everything below it is bytes.
//!
//! ## Append-Only Model
//!
//! A store is one byte stream that only grows:
//!
//! ```text
//! Offset 0:      Header slot A (64 bytes)
//! Offset 64:     Header slot B (64 bytes)
//! Offset 128:    block, block, block, ...   (append-only)
//! ```
//!
//! The header region is the single exception to "never rewrite": it holds two
//! copies of the file header and updates alternate between them, so a crash
//! while one copy is being written leaves the other intact (see [`header`]).
//! Blocks are written exactly once and addressed by their absolute offset for
//! the lifetime of the file.
//!
//! ## Backends
//!
//! | Backend       | Reads                       | Appends                  | Flush        |
//! |---------------|-----------------------------|--------------------------|--------------|
//! | `FileStore`   | positional, lock-free       | serialized by a `Mutex`  | `fsync`      |
//! | `MemoryStore` | shared `RwLock` read guard  | exclusive write guard    | no-op        |
//!
//! ## Thread Safety
//!
//! `BackingStore` requires `Send + Sync`. Readers on different threads may read
//! concurrently with each other and with the single writer's appends: a block
//! is only ever read after the offset that names it was returned by
//! `append`, and published bytes never change.
//!
//! ## Module Organization
//!
//! - `file`: `FileStore`, the durable backend
//! - `memory`: `MemoryStore`, an ephemeral backend for tests and scratch stores
//! - [`header`]: double-slot file header with CRC-64 validation
//! - [`blocks`]: read/append glue between the backend and the codec

pub mod blocks;
mod file;
pub mod header;
mod memory;

pub use file::FileStore;
pub use header::{FileHeader, HeaderSlot};
pub use memory::MemoryStore;

use eyre::Result;

use crate::Offset;

/// Append-only byte store with a fixed in-place header region.
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// Fails with an I/O-category error when the range extends past the end of
    /// the store.
    fn read_at(&self, offset: Offset, len: usize) -> Result<Vec<u8>>;

    /// Appends `bytes` and returns the offset they were written at.
    ///
    /// Offsets returned within one open session are strictly increasing.
    fn append(&self, bytes: &[u8]) -> Result<Offset>;

    /// Makes every prior append and header write durable.
    fn flush(&self) -> Result<()>;

    /// Current length of the store in bytes.
    fn len(&self) -> u64;

    /// Returns true if nothing, not even a header, has been written yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrites one header slot in place. This is the only in-place write a
    /// backend accepts.
    fn write_header_slot(&self, slot: usize, bytes: &[u8]) -> Result<()>;
}
