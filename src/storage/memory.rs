//! In-memory backing store.
//!
//! Behaves exactly like `FileStore` minus durability. Useful for tests and
//! for scratch stores whose history does not need to outlive the process.

use eyre::{bail, ensure, Result};
use parking_lot::RwLock;

use super::BackingStore;
use crate::config::{HEADER_REGION_SIZE, HEADER_SLOT_COUNT, HEADER_SLOT_SIZE};
use crate::error::StoreError;
use crate::Offset;

#[derive(Debug, Default)]
pub struct MemoryStore {
    bytes: RwLock<Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store over existing bytes, e.g. a copy of another store.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }
}

impl BackingStore for MemoryStore {
    fn read_at(&self, offset: Offset, len: usize) -> Result<Vec<u8>> {
        let bytes = self.bytes.read();
        let store_len = bytes.len() as u64;
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if offset <= store_len && end <= bytes.len() => Ok(bytes[start..end].to_vec()),
            _ => bail!(StoreError::ReadOutOfRange {
                offset,
                len,
                store_len
            }),
        }
    }

    fn append(&self, data: &[u8]) -> Result<Offset> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as Offset;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> u64 {
        self.bytes.read().len() as u64
    }

    fn write_header_slot(&self, slot: usize, data: &[u8]) -> Result<()> {
        ensure!(
            slot < HEADER_SLOT_COUNT,
            "header slot {} out of range (slot count {})",
            slot,
            HEADER_SLOT_COUNT
        );
        ensure!(
            data.len() == HEADER_SLOT_SIZE,
            "header slot must be {} bytes, got {}",
            HEADER_SLOT_SIZE,
            data.len()
        );

        let mut bytes = self.bytes.write();
        ensure!(
            bytes.len() >= HEADER_REGION_SIZE,
            "header region has not been initialized"
        );
        let start = slot * HEADER_SLOT_SIZE;
        bytes[start..start + HEADER_SLOT_SIZE].copy_from_slice(data);
        Ok(())
    }
}
