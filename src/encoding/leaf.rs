//! Leaf payloads.
//!
//! A value leaf is the raw value bytes; the block prefix carries its length.
//! A KV leaf stores one map entry plus the link to the next entry whose key
//! hashes to the same 64-bit value:
//!
//! ```text
//! +--------+--------+---------+-----------+-------------+
//! | hash   | next   | key_len | key bytes | value bytes |
//! | u64    | u64    | u32     | key_len   | remainder   |
//! +--------+--------+---------+-----------+-------------+
//! ```

use eyre::Result;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::KV_LEAF_FIXED_SIZE;
use crate::error::StoreError;
use crate::Offset;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct KvLeafPrefix {
    hash: U64,
    next: U64,
    key_len: U32,
}

const _: () = assert!(std::mem::size_of::<KvLeafPrefix>() == KV_LEAF_FIXED_SIZE);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvLeaf {
    pub hash: u64,
    pub next: Option<Offset>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvLeaf {
    pub(crate) fn encoded_len(&self) -> usize {
        KV_LEAF_FIXED_SIZE + self.key.len() + self.value.len()
    }

    pub(crate) fn encode_payload(&self, out: &mut Vec<u8>) {
        let prefix = KvLeafPrefix {
            hash: U64::new(self.hash),
            next: U64::new(self.next.unwrap_or(0)),
            key_len: U32::new(self.key.len() as u32),
        };
        out.extend_from_slice(prefix.as_bytes());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.value);
    }

    pub(crate) fn decode_payload(payload: &[u8]) -> Result<Self> {
        let (prefix, rest) = KvLeafPrefix::ref_from_prefix(payload).map_err(|_| {
            StoreError::format(format!(
                "kv leaf payload of {} bytes is shorter than its {}-byte prefix",
                payload.len(),
                KV_LEAF_FIXED_SIZE
            ))
        })?;

        let key_len = prefix.key_len.get() as usize;
        if key_len > rest.len() {
            return Err(StoreError::format(format!(
                "kv leaf key length {} exceeds remaining payload {}",
                key_len,
                rest.len()
            ))
            .into());
        }
        let (key, value) = rest.split_at(key_len);
        let next = prefix.next.get();

        Ok(Self {
            hash: prefix.hash.get(),
            next: (next != 0).then_some(next),
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }
}
