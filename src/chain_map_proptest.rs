#![cfg(test)]

// Property tests for ChainMap kept inside the crate so they can drive the
// structural layer directly, without going through the hook protocol.

use crate::chain_map::{grown_mask, ChainMap, EntryId, InsertError};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

// Pool-indexed operations to improve shrinking: indices shrink toward
// earlier keys and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    Remove(usize),
    Find(usize),
    Grow,
    Shrink,
    Iterate,
}

fn op_strategy(pool: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..pool, any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        2 => (0..pool).prop_map(Op::Remove),
        3 => (0..pool).prop_map(Op::Find),
        1 => Just(Op::Grow),
        1 => Just(Op::Shrink),
        1 => Just(Op::Iterate),
    ]
}

fn key(i: usize) -> String {
    format!("k{i}")
}

proptest! {
    // Invariant: under any op sequence, ChainMap agrees with a HashMap
    // model on membership, stored values, length, and the iterated entry
    // set, across arbitrary interleavings of grow/shrink.
    #[test]
    fn chain_map_matches_model(
        ops in proptest::collection::vec(op_strategy(8), 1..200),
    ) {
        let mut m: ChainMap<i32> = ChainMap::with_mask(0x01).unwrap();
        let mut model: HashMap<String, i32> = HashMap::new();
        let mut ids: HashMap<String, EntryId> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let k = key(k);
                    match m.insert(&k, v) {
                        Ok(id) => {
                            prop_assert!(!model.contains_key(&k));
                            model.insert(k.clone(), v);
                            ids.insert(k, id);
                        }
                        Err(InsertError::DuplicateKey) => {
                            prop_assert!(model.contains_key(&k));
                        }
                    }
                }
                Op::Remove(k) => {
                    let k = key(k);
                    match ids.remove(&k) {
                        Some(id) => {
                            let (rk, rv) = m.remove(id).expect("live id must remove");
                            prop_assert_eq!(&*rk, k.as_str());
                            prop_assert_eq!(Some(rv), model.remove(&k));
                        }
                        None => prop_assert!(!model.contains_key(&k)),
                    }
                }
                Op::Find(k) => {
                    let k = key(k);
                    let found = m.find(&k);
                    prop_assert_eq!(found.is_some(), model.contains_key(&k));
                    if let Some(id) = found {
                        prop_assert_eq!(Some(id), ids.get(&k).copied());
                        prop_assert_eq!(m.value(id), model.get(&k));
                        prop_assert_eq!(m.key(id), Some(k.as_str()));
                    }
                }
                Op::Grow => {
                    let before = m.mask();
                    m.grow();
                    prop_assert_eq!(m.mask(), grown_mask(before).unwrap_or(before));
                }
                Op::Shrink => {
                    let before = m.mask();
                    m.shrink();
                    prop_assert_eq!(m.mask(), before >> 1);
                }
                Op::Iterate => {
                    let walked: BTreeSet<(String, i32)> =
                        m.iter().map(|(_, k, v)| (k.to_string(), *v)).collect();
                    let expected: BTreeSet<(String, i32)> =
                        model.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    prop_assert_eq!(walked, expected);
                    prop_assert_eq!(m.iter().count(), model.len());
                }
            }

            prop_assert_eq!(m.len(), model.len());
            prop_assert_eq!(m.is_empty(), model.is_empty());
            prop_assert_eq!(m.bucket_count() as u64, m.mask() + 1);
        }

        // Resizing is content-preserving at the end of any run, too.
        m.grow();
        m.shrink();
        for (k, v) in &model {
            let id = m.find(k).expect("model key must survive resize");
            prop_assert_eq!(m.value(id), Some(v));
        }
    }

    // Invariant: iteration order is a pure function of mask and insertion
    // history: two maps fed the same inserts walk identically.
    #[test]
    fn iteration_is_deterministic(
        keys in proptest::collection::btree_set("[a-z]{1,6}", 1..32),
    ) {
        let mut a: ChainMap<u32> = ChainMap::with_mask(0x07).unwrap();
        let mut b: ChainMap<u32> = ChainMap::with_mask(0x07).unwrap();
        for (i, k) in keys.iter().enumerate() {
            a.insert(k, i as u32).unwrap();
            b.insert(k, i as u32).unwrap();
        }

        let wa: Vec<(String, u32)> = a.iter().map(|(_, k, v)| (k.to_string(), *v)).collect();
        let wb: Vec<(String, u32)> = b.iter().map(|(_, k, v)| (k.to_string(), *v)).collect();
        prop_assert_eq!(wa, wb);
    }
}
