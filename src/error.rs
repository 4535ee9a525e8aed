//! # Error Taxonomy
//!
//! Every fallible operation in cowdb returns `eyre::Result`. Failures that a
//! caller may want to branch on are raised as a [`StoreError`] inside the
//! report, so they can be recovered with `Report::downcast_ref`:
//!
//! ```ignore
//! match store.begin_write() {
//!     Ok(txn) => { /* ... */ }
//!     Err(e) if error_kind(&e) == Some(ErrorKind::Concurrency) => { /* retry later */ }
//!     Err(e) => return Err(e),
//! }
//! ```
//!
//! I/O failures coming from the operating system keep their `std::io::Error`
//! in the report chain with path/offset context layered on top via
//! `WrapErr`. [`error_kind`] walks the chain and classifies either form.
//!
//! Out-of-range array reads and missing map keys are not errors at all; they
//! surface as `Option::None`.

use thiserror::Error;

use crate::Offset;

/// Coarse failure category of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backing store read/append/sync failure, including reads past the end.
    Io,
    /// Corrupt or incompatible bytes.
    Format,
    /// Index outside the valid range of a mutating array operation.
    Index,
    /// A second write transaction was requested while one is active.
    Concurrency,
    /// The store root holds a different collection than the one requested.
    KindMismatch,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("read of {len} bytes at offset {offset} exceeds store length {store_len}")]
    ReadOutOfRange {
        offset: Offset,
        len: usize,
        store_len: u64,
    },

    #[error("malformed data: {detail}")]
    Format { detail: String },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("a write transaction is already active on this store")]
    WriterActive,

    #[error("store root holds {found}, not {expected}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl StoreError {
    pub fn format(detail: impl Into<String>) -> Self {
        StoreError::Format {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ReadOutOfRange { .. } => ErrorKind::Io,
            StoreError::Format { .. } => ErrorKind::Format,
            StoreError::IndexOutOfRange { .. } => ErrorKind::Index,
            StoreError::WriterActive => ErrorKind::Concurrency,
            StoreError::KindMismatch { .. } => ErrorKind::KindMismatch,
        }
    }
}

/// Classifies a report by the first [`StoreError`] or `std::io::Error` in its
/// chain. Returns `None` for untyped failures.
pub fn error_kind(report: &eyre::Report) -> Option<ErrorKind> {
    if let Some(err) = report.downcast_ref::<StoreError>() {
        return Some(err.kind());
    }
    if report.downcast_ref::<std::io::Error>().is_some() {
        return Some(ErrorKind::Io);
    }
    for cause in report.chain() {
        if let Some(err) = cause.downcast_ref::<StoreError>() {
            return Some(err.kind());
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return Some(ErrorKind::Io);
        }
    }
    None
}
