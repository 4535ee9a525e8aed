//! Fuzz testing for the persistent collections.
//!
//! Runs an arbitrary sequence of map operations, committing every few steps,
//! and compares each committed version against a `BTreeMap` model.

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use cowdb::{Durability, Store};

#[derive(Debug, Arbitrary)]
enum Op {
    Set { key: u8, value: Vec<u8> },
    Delete { key: u8 },
    Commit,
}

#[derive(Debug, Arbitrary)]
struct Input {
    branching_shift: u8,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let branching_factor = 4u16 << (input.branching_shift % 7);
    let store = Store::builder()
        .in_memory()
        .branching_factor(branching_factor)
        .durability(Durability::None)
        .open()
        .unwrap();

    let mut model = BTreeMap::new();
    let mut versions = Vec::new();
    let mut txn = store.begin_write().unwrap();

    for op in input.ops.iter().take(256) {
        match op {
            Op::Set { key, value } => {
                txn.map().unwrap().set(&[*key], value).unwrap();
                model.insert(vec![*key], value.clone());
            }
            Op::Delete { key } => {
                txn.map().unwrap().delete(&[*key]).unwrap();
                model.remove(&vec![*key]);
            }
            Op::Commit => {
                let version = txn.commit().unwrap();
                versions.push((version.offset, model.clone()));
                txn = store.begin_write().unwrap();
            }
        }
    }
    drop(txn);

    for (offset, expected) in versions {
        let read = store.begin_read_at(offset).unwrap();
        let map = read.map().unwrap();
        let seen: BTreeMap<Vec<u8>, Vec<u8>> = map.iter().map(|e| e.unwrap()).collect();
        assert_eq!(seen, expected);
        assert_eq!(map.len().unwrap(), expected.len() as u64);
    }
});
