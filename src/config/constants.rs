//! # cowdb Configuration Constants
//!
//! Format geometry and tunable defaults live here so that the encoder, the
//! header code and the collections agree on a single set of values.
//!
//! ## Dependency Graph
//!
//! ```text
//! HEADER_SLOT_SIZE (64 bytes)
//!       │
//!       └─> HEADER_REGION_SIZE (2 slots = 128 bytes)
//!             First block offset. Offset 0 therefore never names a block
//!             and doubles as the on-disk NONE sentinel.
//!
//! SLOT_SIZE (9 bytes: kind + u64 offset)
//!       │
//!       ├─> ARRAY_NODE_FIXED_SIZE + B * SLOT_SIZE  = array node payload
//!       └─> MAP_NODE_FIXED_SIZE + B * SLOT_SIZE    = map node payload
//!
//! DEFAULT_BRANCHING_FACTOR (32)
//!       │
//!       ├─> must be a power of two in MIN..=MAX_BRANCHING_FACTOR
//!       └─> map bit-group width = log2(B); trie depth = ceil(64 / width)
//! ```
//!
//! ## Header-Recorded Tunables
//!
//! `branching_factor`, `hash_version` and `collapse_threshold` are written
//! into the file header at creation. Readers always use the recorded values,
//! never these defaults, once a file exists.

// ============================================================================
// FILE HEADER GEOMETRY
// ============================================================================

/// Magic bytes at the start of every header slot.
pub const MAGIC: &[u8; 8] = b"cowdb\x00\x00\x01";

/// On-disk format version understood by this build.
pub const FORMAT_VERSION: u16 = 1;

/// Size of one header slot in bytes.
pub const HEADER_SLOT_SIZE: usize = 64;

/// Number of header slots. Updates alternate between them.
pub const HEADER_SLOT_COUNT: usize = 2;

/// Size of the fixed header region at offset 0.
pub const HEADER_REGION_SIZE: usize = HEADER_SLOT_SIZE * HEADER_SLOT_COUNT;

const _: () = assert!(
    HEADER_REGION_SIZE == 128,
    "header region must stay 128 bytes for format version 1"
);

// ============================================================================
// BLOCK GEOMETRY
// ============================================================================

/// Every block starts with a tag byte and a little-endian u32 payload length.
pub const BLOCK_PREFIX_SIZE: usize = 5;

/// Fixed stride of a node slot: kind byte + u64 offset.
pub const SLOT_SIZE: usize = 9;

/// Array node payload bytes before the slot table: height, slot count, count.
pub const ARRAY_NODE_FIXED_SIZE: usize = 1 + 2 + 8;

/// Map node payload bytes before the slot table: slot count, count.
pub const MAP_NODE_FIXED_SIZE: usize = 2 + 8;

/// KV leaf payload bytes before the key: hash, next, key length.
pub const KV_LEAF_FIXED_SIZE: usize = 8 + 8 + 4;

/// Version block payload size.
pub const VERSION_BLOCK_SIZE: usize = 1 + 8 * 5;

/// Largest payload a single block may carry.
pub const MAX_BLOCK_PAYLOAD: usize = u32::MAX as usize;

// ============================================================================
// BRANCHING FACTOR
// ============================================================================

/// Default fan-out per array level and per map trie level.
pub const DEFAULT_BRANCHING_FACTOR: u16 = 32;

/// Smallest accepted branching factor.
pub const MIN_BRANCHING_FACTOR: u16 = 4;

/// Largest accepted branching factor.
pub const MAX_BRANCHING_FACTOR: u16 = 256;

const _: () = assert!(DEFAULT_BRANCHING_FACTOR.is_power_of_two());
const _: () = assert!(MIN_BRANCHING_FACTOR.is_power_of_two());
const _: () = assert!(MAX_BRANCHING_FACTOR.is_power_of_two());
const _: () = assert!(
    MIN_BRANCHING_FACTOR <= DEFAULT_BRANCHING_FACTOR
        && DEFAULT_BRANCHING_FACTOR <= MAX_BRANCHING_FACTOR
);

/// Slot counts are encoded as u16.
const _: () = assert!(MAX_BRANCHING_FACTOR as usize <= u16::MAX as usize);

// ============================================================================
// MAP TUNABLES
// ============================================================================

/// Hash function version 1: xxh3_64 with seed 0.
pub const HASH_VERSION_XXH3: u16 = 1;

/// Hash function version written into new files.
pub const DEFAULT_HASH_VERSION: u16 = HASH_VERSION_XXH3;

/// A non-root map node whose live slots are all leaves and number at most
/// this many is folded into its parent on delete. Only 0 (never collapse)
/// and 1 are meaningful since a parent slot holds one leaf chain.
pub const DEFAULT_COLLAPSE_THRESHOLD: u8 = 1;

/// Largest accepted collapse threshold.
pub const MAX_COLLAPSE_THRESHOLD: u8 = 1;

/// Width in bits of the key hash walked by the trie.
pub const HASH_BITS: u32 = 64;
