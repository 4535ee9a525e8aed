//! # File-Backed Store
//!
//! `FileStore` keeps a single `File` handle open for the lifetime of the store
//! and uses positional I/O for everything, so there is no shared seek cursor
//! and readers never contend with each other or with the writer.
//!
//! ## Append Protocol
//!
//! ```text
//! lock(append_lock)
//!   offset = len
//!   pwrite(bytes, offset)
//!   len = offset + bytes.len()     <- Release: bytes visible before offset is
//! unlock                              handed to anyone
//! ```
//!
//! `len` is tracked in memory rather than re-read from file metadata, so a
//! reader can never observe an offset whose bytes are still being written.
//!
//! ## Durability
//!
//! `flush()` issues `sync_data`, which covers both appended bytes and the file
//! size change. Header slots are written with the same positional write and
//! made durable by the next `flush()`.
//!
//! ## Platform Support
//!
//! - Unix: `FileExt::read_exact_at` / `write_all_at` (pread/pwrite)
//! - Windows: `FileExt::seek_read` / `seek_write` loops

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use eyre::{bail, ensure, Result, WrapErr};
use parking_lot::Mutex;

use super::BackingStore;
use crate::config::{HEADER_REGION_SIZE, HEADER_SLOT_COUNT, HEADER_SLOT_SIZE};
use crate::error::StoreError;
use crate::Offset;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: File,
    len: AtomicU64,
    append_lock: Mutex<()>,
}

impl FileStore {
    /// Opens `path` for reading and appending, creating an empty file when
    /// `create` is set and nothing exists yet. Existing bytes are never
    /// truncated.
    pub fn open<P: AsRef<Path>>(path: P, create: bool) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(path)
            .wrap_err_with(|| format!("failed to open store file '{}'", path.display()))?;

        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: AtomicU64::new(len),
            append_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackingStore for FileStore {
    fn read_at(&self, offset: Offset, len: usize) -> Result<Vec<u8>> {
        let store_len = self.len.load(Ordering::Acquire);
        let end = offset.checked_add(len as u64);
        if !matches!(end, Some(end) if end <= store_len) {
            bail!(StoreError::ReadOutOfRange {
                offset,
                len,
                store_len
            });
        }

        let mut buf = vec![0u8; len];
        read_exact_at(&self.file, &mut buf, offset).wrap_err_with(|| {
            format!(
                "failed to read {} bytes at offset {} from '{}'",
                len,
                offset,
                self.path.display()
            )
        })?;
        Ok(buf)
    }

    fn append(&self, bytes: &[u8]) -> Result<Offset> {
        let _guard = self.append_lock.lock();

        let offset = self.len.load(Ordering::Acquire);
        write_all_at(&self.file, bytes, offset).wrap_err_with(|| {
            format!(
                "failed to append {} bytes at offset {} to '{}'",
                bytes.len(),
                offset,
                self.path.display()
            )
        })?;
        self.len
            .store(offset + bytes.len() as u64, Ordering::Release);

        Ok(offset)
    }

    fn flush(&self) -> Result<()> {
        self.file
            .sync_data()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }

    fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    fn write_header_slot(&self, slot: usize, bytes: &[u8]) -> Result<()> {
        ensure!(
            slot < HEADER_SLOT_COUNT,
            "header slot {} out of range (slot count {})",
            slot,
            HEADER_SLOT_COUNT
        );
        ensure!(
            bytes.len() == HEADER_SLOT_SIZE,
            "header slot must be {} bytes, got {}",
            HEADER_SLOT_SIZE,
            bytes.len()
        );
        ensure!(
            self.len() >= HEADER_REGION_SIZE as u64,
            "header region of '{}' has not been initialized",
            self.path.display()
        );

        let _guard = self.append_lock.lock();
        let offset = (slot * HEADER_SLOT_SIZE) as u64;
        write_all_at(&self.file, bytes, offset).wrap_err_with(|| {
            format!(
                "failed to write header slot {} of '{}'",
                slot,
                self.path.display()
            )
        })
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
