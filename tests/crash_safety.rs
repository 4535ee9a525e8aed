//! # Crash Safety Tests
//!
//! Simulates the states a crash can leave a store file in and checks that
//! reopening always yields the last fully published version:
//!
//! - nodes appended but the header never updated
//! - a partially written trailing block
//! - a torn write into the header slot being updated
//! - a header slot that reached the disk before the blocks it commits
//!
//! It also covers files that are not stores at all, or were created with
//! different settings.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use cowdb::{error_kind, Durability, ErrorKind, Store};
use crc::{Crc, CRC_64_ECMA_182};
use tempfile::tempdir;

const SLOT_SIZE: usize = 64;
const CHECKSUM_AT: usize = SLOT_SIZE - 8;

fn commit_values(store: &Store, values: &[&[u8]]) -> cowdb::VersionRecord {
    let mut txn = store.begin_write().unwrap();
    for value in values {
        txn.array().unwrap().push(value).unwrap();
    }
    txn.commit().unwrap()
}

fn read_all(store: &Store) -> Vec<Vec<u8>> {
    let read = store.begin_read().unwrap();
    let array = read.array().unwrap();
    array.iter().map(|v| v.unwrap()).collect()
}

fn overwrite(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

/// Rewrites both header slots with `edit` applied and their checksums fixed.
fn rewrite_header_slots(path: &Path, edit: impl Fn(&mut [u8])) {
    let crc = Crc::<u64>::new(&CRC_64_ECMA_182);
    let mut region = fs::read(path).unwrap()[..2 * SLOT_SIZE].to_vec();
    for slot in region.chunks_exact_mut(SLOT_SIZE) {
        edit(slot);
        let checksum = crc.checksum(&slot[..CHECKSUM_AT]);
        slot[CHECKSUM_AT..].copy_from_slice(&checksum.to_le_bytes());
    }
    overwrite(path, 0, &region);
}

mod interrupted_commit_tests {
    use super::*;

    #[test]
    fn appended_nodes_without_header_update_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("interrupted.cow");

        let committed_len = {
            let store = Store::open(&path).unwrap();
            commit_values(&store, &[b"first", b"second"]);
            let committed_len = store.info().committed_len;

            let mut txn = store.begin_write().unwrap();
            for i in 0..50u8 {
                txn.array().unwrap().push(&[i; 40]).unwrap();
            }
            // Dropped without commit: the nodes are in the file, the header is not.
            drop(txn);
            committed_len
        };

        let file_len = fs::metadata(&path).unwrap().len();
        assert!(file_len > committed_len);

        let store = Store::open(&path).unwrap();
        assert_eq!(read_all(&store), vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(store.info().committed_len, committed_len);
        assert_eq!(store.info().file_len, file_len);
    }

    #[test]
    fn truncated_trailing_block_is_ignored_and_appends_continue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("torn-append.cow");

        let committed_len = {
            let store = Store::open(&path).unwrap();
            commit_values(&store, &[b"durable"]);
            let committed_len = store.info().committed_len;

            let mut txn = store.begin_write().unwrap();
            txn.array().unwrap().push(&[0xAB; 300]).unwrap();
            txn.abort();
            committed_len
        };

        // Cut the file in the middle of the uncommitted tail.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(committed_len + 17).unwrap();
        drop(file);

        let store = Store::open(&path).unwrap();
        assert_eq!(read_all(&store), vec![b"durable".to_vec()]);

        commit_values(&store, &[b"after"]);
        drop(store);

        let store = Store::open(&path).unwrap();
        assert_eq!(read_all(&store), vec![b"durable".to_vec(), b"after".to_vec()]);
        assert_eq!(store.info().version_count, 2);
    }

    #[test]
    fn torn_header_slot_falls_back_to_previous_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("torn-header.cow");

        {
            let store = Store::open(&path).unwrap();
            commit_values(&store, &[b"v1"]);
            commit_values(&store, &[b"v2"]);
        }

        // A new store starts at header sequence 1; two commits publish sequence
        // 3, which lives in slot 3 % 2 = 1.
        overwrite(&path, 64 + 20, &[0xFF; 16]);

        let store = Store::open(&path).unwrap();
        assert_eq!(read_all(&store), vec![b"v1".to_vec()]);
        assert_eq!(store.info().version_count, 1);

        // The next commit overwrites the damaged slot and the chain continues.
        let version = commit_values(&store, &[b"v2-again"]);
        assert_eq!(version.sequence, 2);
        drop(store);

        let store = Store::open(&path).unwrap();
        assert_eq!(read_all(&store), vec![b"v1".to_vec(), b"v2-again".to_vec()]);
    }

    #[test]
    fn header_ahead_of_unsynced_blocks_falls_back_to_previous_slot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unsynced.cow");

        let first_len = {
            let store = Store::builder()
                .path(&path)
                .durability(Durability::None)
                .open()
                .unwrap();
            commit_values(&store, &[b"kept"]);
            let first_len = store.info().committed_len;
            commit_values(&store, &[b"lost"]);
            first_len
        };

        // The second header slot survived the crash, the blocks it commits did not.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(first_len + 5).unwrap();
        drop(file);

        let store = Store::open(&path).unwrap();
        assert_eq!(read_all(&store), vec![b"kept".to_vec()]);
        assert_eq!(store.info().version_count, 1);

        let version = commit_values(&store, &[b"again"]);
        assert_eq!(version.sequence, 2);
        drop(store);

        let store = Store::open(&path).unwrap();
        assert_eq!(read_all(&store), vec![b"kept".to_vec(), b"again".to_vec()]);
    }

    #[test]
    fn both_header_slots_corrupt_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("both-torn.cow");
        {
            let store = Store::open(&path).unwrap();
            commit_values(&store, &[b"x"]);
        }

        overwrite(&path, 30, &[0xEE; 8]);
        overwrite(&path, 64 + 30, &[0xEE; 8]);

        let err = Store::open(&path).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Format));
    }
}

mod format_tests {
    use super::*;

    #[test]
    fn foreign_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign.bin");
        fs::write(&path, vec![0x5Au8; 512]).unwrap();

        let err = Store::open(&path).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Format));
        assert!(format!("{:?}", err).contains("not a cowdb store"));
    }

    #[test]
    fn short_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.cow");
        fs::write(&path, b"cowdb").unwrap();

        let err = Store::open(&path).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Format));
    }

    #[test]
    fn branching_factor_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b16.cow");
        {
            let store = Store::builder()
                .path(&path)
                .branching_factor(16)
                .open()
                .unwrap();
            commit_values(&store, &[b"a"]);
        }

        let err = Store::builder()
            .path(&path)
            .branching_factor(32)
            .open()
            .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Format));

        let store = Store::builder()
            .path(&path)
            .branching_factor(16)
            .open()
            .unwrap();
        assert_eq!(store.info().branching_factor, 16);

        let store = Store::open(&path).unwrap();
        assert_eq!(store.info().branching_factor, 16);
        assert_eq!(read_all(&store), vec![b"a".to_vec()]);
    }

    #[test]
    fn file_shorter_than_every_committed_length_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cut.cow");
        let first_len = {
            let store = Store::open(&path).unwrap();
            commit_values(&store, &[b"a", b"b", b"c"]);
            let first_len = store.info().committed_len;
            commit_values(&store, &[b"d"]);
            first_len
        };

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(first_len - 3).unwrap();
        drop(file);

        let err = Store::open(&path).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Format));
    }

    #[test]
    fn unknown_hash_function_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hash.cow");
        {
            let store = Store::open(&path).unwrap();
            commit_values(&store, &[b"a"]);
        }

        rewrite_header_slots(&path, |slot| slot[12..14].copy_from_slice(&7u16.to_le_bytes()));

        let err = Store::open(&path).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Format));
        assert!(format!("{:?}", err).contains("hash function version 7"));
    }
}
