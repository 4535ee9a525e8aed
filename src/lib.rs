//! # cowdb - Append-Only Versioned Collections
//!
//! cowdb is an embedded, file-backed store in which every write produces a
//! new immutable version of the data. Nothing already written is ever
//! overwritten, so every past version stays readable for the life of the
//! file.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cowdb::Store;
//!
//! let store = Store::builder()
//!     .path("./events.cow")
//!     .branching_factor(32)
//!     .open()?;
//!
//! let mut txn = store.begin_write()?;
//! let mut events = txn.array()?;
//! events.push(b"created")?;
//! events.push(b"shipped")?;
//! txn.commit()?;
//!
//! let read = store.begin_read()?;
//! assert_eq!(read.array()?.get(1)?, Some(b"shipped".to_vec()));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Store / ReadTxn / WriteTxn          │  database
//! ├─────────────────────────────────────┤
//! │  Version history chain               │  history
//! ├──────────────────┬──────────────────┤
//! │  Persistent array│  Map and set      │  array, hamt
//! ├──────────────────┴──────────────────┤
//! │  Node codec                          │  encoding
//! ├─────────────────────────────────────┤
//! │  Append-only backing store + header  │  storage
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! ```text
//! Offset 0     header slot A (64 bytes, CRC-64)
//! Offset 64    header slot B (64 bytes, CRC-64)
//! Offset 128   [tag][len][payload] [tag][len][payload] ...
//! ```
//!
//! A commit appends new nodes along each mutated path, appends one version
//! block, then writes the header slot that does not hold the current header.
//! A crash at any point leaves either the old or the new header valid.
//!
//! ## Module Overview
//!
//! - [`storage`]: backing stores, double-slot header, block I/O
//! - [`encoding`]: block codec
//! - [`array`]: copy-on-write indexed sequence
//! - [`hamt`]: copy-on-write hash array mapped trie behind maps and sets
//! - [`history`]: version records and their parent chain
//! - [`database`]: stores and transactions
//! - [`config`], [`error`], [`hash`]: constants, error taxonomy, key hashing

pub mod array;
pub mod config;
pub mod database;
pub mod encoding;
pub mod error;
pub mod hamt;
pub mod hash;
pub mod history;
pub mod storage;

/// Absolute byte position of a block within a store.
pub type Offset = u64;

pub use database::{
    ArrayReader, ArrayWriter, Durability, MapReader, MapWriter, ReadTxn, SetReader, SetWriter,
    Store, StoreBuilder, StoreInfo, WriteTxn,
};
pub use encoding::RootKind;
pub use error::{error_kind, ErrorKind, StoreError};
pub use history::{History, VersionRecord};
