//! Fuzz testing for the block codec.
//!
//! Feeds arbitrary bytes to the decoder, which must either reject them with
//! an error or produce a block that encodes and decodes back to itself.

#![no_main]

use libfuzzer_sys::fuzz_target;

use cowdb::encoding::{decode, decode_prefix, encode};

fuzz_target!(|data: &[u8]| {
    let _ = decode_prefix(data);

    if let Ok(block) = decode(data) {
        let bytes = encode(&block).expect("decoded block must re-encode");
        let again = decode(&bytes).expect("re-encoded block must decode");
        assert_eq!(block, again);
    }
});
