//! # Model Tests
//!
//! Checks every collection against a standard library reference model:
//! the map against `BTreeMap`, the set against `BTreeSet` and the array
//! against `Vec`, with every
//! intermediate version re-read and compared after the whole sequence of
//! commits. Also checks the write amplification of a single update.

use std::collections::{BTreeMap, BTreeSet};

use cowdb::{Durability, Store};
use proptest::prelude::*;

fn small_store(branching_factor: u16) -> Store {
    Store::builder()
        .in_memory()
        .branching_factor(branching_factor)
        .durability(Durability::None)
        .open()
        .unwrap()
}

#[derive(Debug, Clone)]
enum MapOp {
    Set(u8, Vec<u8>),
    Delete(u8),
}

fn map_op() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        3 => (0u8..40, prop::collection::vec(any::<u8>(), 0..12)).prop_map(|(k, v)| MapOp::Set(k, v)),
        1 => (0u8..40).prop_map(MapOp::Delete),
    ]
}

#[derive(Debug, Clone)]
enum SetOp {
    Insert(u8),
    Remove(u8),
}

fn set_op() -> impl Strategy<Value = SetOp> {
    prop_oneof![
        3 => (0u8..60).prop_map(SetOp::Insert),
        2 => (0u8..60).prop_map(SetOp::Remove),
    ]
}

fn map_key(k: u8) -> Vec<u8> {
    format!("key/{}", k).into_bytes()
}

#[derive(Debug, Clone)]
enum ArrayOp {
    Push(Vec<u8>),
    Set(usize, Vec<u8>),
    Truncate(usize),
}

fn array_op() -> impl Strategy<Value = ArrayOp> {
    prop_oneof![
        6 => prop::collection::vec(any::<u8>(), 0..8).prop_map(ArrayOp::Push),
        2 => (any::<usize>(), prop::collection::vec(any::<u8>(), 0..8))
            .prop_map(|(i, v)| ArrayOp::Set(i, v)),
        1 => any::<usize>().prop_map(ArrayOp::Truncate),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn map_matches_btreemap_at_every_version(
        batches in prop::collection::vec(prop::collection::vec(map_op(), 1..12), 1..10),
        collapse in 0u8..=1,
    ) {
        let store = Store::builder()
            .in_memory()
            .branching_factor(4)
            .collapse_threshold(collapse)
            .durability(Durability::None)
            .open()
            .unwrap();
        let mut model = BTreeMap::new();
        let mut snapshots = Vec::new();

        for batch in &batches {
            let mut txn = store.begin_write().unwrap();
            {
                let mut map = txn.map().unwrap();
                for op in batch {
                    match op {
                        MapOp::Set(k, v) => {
                            let inserted = map.set(&map_key(*k), v).unwrap();
                            prop_assert_eq!(inserted, model.insert(map_key(*k), v.clone()).is_none());
                        }
                        MapOp::Delete(k) => {
                            let removed = map.delete(&map_key(*k)).unwrap();
                            prop_assert_eq!(removed, model.remove(&map_key(*k)).is_some());
                        }
                    }
                }
            }
            let version = txn.commit().unwrap();
            prop_assert_eq!(version.size, model.len() as u64);
            snapshots.push((version.offset, model.clone()));
        }

        for (offset, expected) in &snapshots {
            let read = store.begin_read_at(*offset).unwrap();
            let map = read.map().unwrap();

            prop_assert_eq!(map.len().unwrap(), expected.len() as u64);
            for k in 0u8..40 {
                prop_assert_eq!(map.get(&map_key(k)).unwrap(), expected.get(&map_key(k)).cloned());
            }
            let seen: BTreeMap<Vec<u8>, Vec<u8>> = map.iter().map(|e| e.unwrap()).collect();
            prop_assert_eq!(&seen, expected);
            prop_assert_eq!(map.iter().count(), expected.len());
        }
    }

    #[test]
    fn array_matches_vec_at_every_version(
        batches in prop::collection::vec(prop::collection::vec(array_op(), 1..20), 1..8),
    ) {
        let store = small_store(4);
        let mut model: Vec<Vec<u8>> = Vec::new();
        let mut snapshots = Vec::new();

        for batch in &batches {
            let mut txn = store.begin_write().unwrap();
            {
                let mut array = txn.array().unwrap();
                for op in batch {
                    match op {
                        ArrayOp::Push(v) => {
                            let index = array.push(v).unwrap();
                            prop_assert_eq!(index, model.len() as u64);
                            model.push(v.clone());
                        }
                        ArrayOp::Set(seed, v) => {
                            if model.is_empty() {
                                prop_assert!(array.set(0, v).is_err());
                            } else {
                                let index = seed % model.len();
                                array.set(index as u64, v).unwrap();
                                model[index] = v.clone();
                            }
                        }
                        ArrayOp::Truncate(seed) => {
                            let new_len = seed % (model.len() + 1);
                            array.truncate(new_len as u64).unwrap();
                            model.truncate(new_len);
                        }
                    }
                }
            }
            txn.commit().unwrap();
            snapshots.push((store.latest().unwrap().unwrap().offset, model.clone()));
        }

        for (offset, expected) in &snapshots {
            let read = store.begin_read_at(*offset).unwrap();
            let array = read.array().unwrap();

            prop_assert_eq!(array.len().unwrap(), expected.len() as u64);
            for (i, value) in expected.iter().enumerate() {
                let got = array.get(i as u64).unwrap();
                prop_assert_eq!(got.as_ref(), Some(value));
            }
            prop_assert_eq!(array.get(expected.len() as u64).unwrap(), None);
            let values: Vec<Vec<u8>> = array.iter().map(|v| v.unwrap()).collect();
            prop_assert_eq!(&values, expected);
        }
    }

    #[test]
    fn set_matches_btreeset_at_every_version(
        batches in prop::collection::vec(prop::collection::vec(set_op(), 1..16), 1..8),
    ) {
        let store = small_store(4);
        let mut model = BTreeSet::new();
        let mut snapshots = Vec::new();

        for batch in &batches {
            let mut txn = store.begin_write().unwrap();
            {
                let mut set = txn.set().unwrap();
                for op in batch {
                    match op {
                        SetOp::Insert(k) => {
                            let inserted = set.insert(&map_key(*k)).unwrap();
                            prop_assert_eq!(inserted, model.insert(map_key(*k)));
                        }
                        SetOp::Remove(k) => {
                            let removed = set.remove(&map_key(*k)).unwrap();
                            prop_assert_eq!(removed, model.remove(&map_key(*k)));
                        }
                    }
                }
            }
            let version = txn.commit().unwrap();
            prop_assert_eq!(version.size, model.len() as u64);
            snapshots.push((version.offset, model.clone()));
        }

        for (offset, expected) in &snapshots {
            let read = store.begin_read_at(*offset).unwrap();
            let set = read.set().unwrap();

            prop_assert_eq!(set.len().unwrap(), expected.len() as u64);
            for k in 0u8..60 {
                prop_assert_eq!(set.contains(&map_key(k)).unwrap(), expected.contains(&map_key(k)));
            }
            let seen: BTreeSet<Vec<u8>> = set.iter().map(|m| m.unwrap()).collect();
            prop_assert_eq!(&seen, expected);
            prop_assert_eq!(set.iter().count(), expected.len());
        }
    }
}

mod boundary_tests {
    use super::*;

    #[test]
    fn array_order_at_tree_boundaries() {
        for b in [4u16, 32] {
            let b_usize = b as usize;
            for n in [0, 1, b_usize, b_usize + 1, b_usize * b_usize] {
                let store = small_store(b);
                let mut txn = store.begin_write().unwrap();
                for i in 0..n as u32 {
                    txn.array().unwrap().push(&i.to_le_bytes()).unwrap();
                }
                txn.commit().unwrap();

                let read = store.begin_read().unwrap();
                let array = read.array().unwrap();
                let values: Vec<Vec<u8>> = array.iter().map(|v| v.unwrap()).collect();
                let expected: Vec<Vec<u8>> =
                    (0..n as u32).map(|i| i.to_le_bytes().to_vec()).collect();

                assert_eq!(values, expected, "b={} n={}", b, n);
                assert_eq!(array.len().unwrap(), n as u64);
                if n > 0 {
                    assert_eq!(
                        array.get(n as u64 - 1).unwrap(),
                        Some((n as u32 - 1).to_le_bytes().to_vec())
                    );
                }
            }
        }
    }

    #[test]
    fn map_survives_growth_and_full_drain() {
        let store = small_store(4);
        let keys: BTreeSet<Vec<u8>> = (0..500u32).map(|i| i.to_be_bytes().to_vec()).collect();

        let mut txn = store.begin_write().unwrap();
        for key in &keys {
            txn.map().unwrap().set(key, key).unwrap();
        }
        let full = txn.commit().unwrap();
        assert_eq!(full.size, 500);

        let mut txn = store.begin_write().unwrap();
        for key in &keys {
            assert!(txn.map().unwrap().delete(key).unwrap());
        }
        let drained = txn.commit().unwrap();

        assert_eq!(drained.size, 0);
        assert_eq!(drained.root, None);
        let read = store.begin_read().unwrap();
        assert!(read.map().unwrap().is_empty());
        assert_eq!(read.map().unwrap().iter().count(), 0);

        let read = store.begin_read_at(full.offset).unwrap();
        assert_eq!(read.map().unwrap().iter().count(), 500);
    }
}

mod sharing_tests {
    use super::*;

    const B: u64 = 32;
    // prefix + slot_count/count + B slots
    const MAP_NODE_BYTES: u64 = 5 + 10 + B * 9;
    const ARRAY_NODE_BYTES: u64 = 5 + 11 + B * 9;
    const VERSION_BYTES: u64 = 5 + 41;

    #[test]
    fn single_map_update_appends_one_path() {
        let store = small_store(B as u16);
        let mut txn = store.begin_write().unwrap();
        for i in 0..5000u32 {
            txn.map().unwrap().set(&i.to_le_bytes(), b"initial").unwrap();
        }
        txn.commit().unwrap();
        let before = store.info().file_len;

        let mut txn = store.begin_write().unwrap();
        txn.map().unwrap().set(&1234u32.to_le_bytes(), b"updated").unwrap();
        txn.commit().unwrap();
        let grown = store.info().file_len - before;

        // 5000 keys sit 3 or 4 levels deep; allow one spare level.
        let leaf = 5 + 20 + 4 + 7;
        assert!(
            grown <= 5 * MAP_NODE_BYTES + leaf + VERSION_BYTES,
            "one update appended {} bytes",
            grown
        );
        assert!(grown < before / 100);
    }

    #[test]
    fn single_array_update_appends_one_path() {
        let store = small_store(B as u16);
        let mut txn = store.begin_write().unwrap();
        for i in 0..(B * B * 2) as u32 {
            txn.array().unwrap().push(&i.to_le_bytes()).unwrap();
        }
        txn.commit().unwrap();
        let before = store.info().file_len;

        let mut txn = store.begin_write().unwrap();
        txn.array().unwrap().set(777, b"edit").unwrap();
        txn.commit().unwrap();
        let grown = store.info().file_len - before;

        // Height 2: root, one internal node, one terminal node, one leaf.
        let leaf = 5 + 4;
        assert_eq!(grown, 3 * ARRAY_NODE_BYTES + leaf + VERSION_BYTES);
    }
}
