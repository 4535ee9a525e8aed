//! # Database Module
//!
//! The public entry point of cowdb: opening stores and running transactions
//! against them.
//!
//! ## Architecture
//!
//! ```text
//!            Store (Arc, Clone + Send + Sync)
//!       ┌──────────────┼──────────────────┐
//!       ▼              ▼                  ▼
//!   ReadTxn        WriteTxn            history()
//!   (pinned        (single writer,     most recent
//!    version)       WriterGuard)       version first
//!       │              │
//!       ▼              ▼
//!  ArrayReader    ArrayWriter   ──> array::ArrayTree
//!  MapReader      MapWriter     ──> hamt::HashTrie
//!  SetReader      SetWriter     ──> hamt::HashTrie (empty values)
//!                      │
//!                      ▼ commit()
//!            history::commit + header swap
//! ```
//!
//! ## Thread Safety
//!
//! `Store` is `Send + Sync`. Any number of threads may hold read
//! transactions while one write transaction runs; a second `begin_write`
//! fails fast with a concurrency error instead of blocking.
//!
//! ## Usage Example
//!
//! ```ignore
//! use cowdb::Store;
//!
//! let store = Store::open("./inventory.cow")?;
//!
//! let mut txn = store.begin_write()?;
//! txn.map()?.set(b"widgets", b"12")?;
//! let v1 = txn.commit()?;
//!
//! let mut txn = store.begin_write()?;
//! txn.map()?.set(b"widgets", b"9")?;
//! txn.commit()?;
//!
//! // The first version is still readable.
//! let old = store.begin_read_at(v1.offset)?;
//! assert_eq!(old.map()?.get(b"widgets")?, Some(b"12".to_vec()));
//! ```

mod builder;
mod store;
mod transaction;

pub use builder::{Durability, StoreBuilder};
pub use store::{Store, StoreInfo};
pub use transaction::{
    ArrayReader, ArrayWriter, MapReader, MapWriter, ReadTxn, SetReader, SetWriter, WriteTxn,
};
