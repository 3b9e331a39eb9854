use rand::{rngs::StdRng, Rng, SeedableRng};

use super::*;

use std::sync::Arc;

use crate::db::{Addr, CmpI64};
use crate::store::{Config, Mode};

fn rec(addr: u64, key: i64) -> Rec {
    Rec::new(Addr::new(addr), Arc::from(key.to_ne_bytes().to_vec()), 0)
}

fn key_of(r: &Rec) -> i64 {
    let mut b = [0_u8; 8];
    b.copy_from_slice(r.as_bytes());
    i64::from_ne_bytes(b)
}

fn sink() -> Arc<DataStore> {
    DataStore::open("sink", Config::new(Mode::BankIndirect, 8)).unwrap()
}

fn collect_fwd(index: &RbtIndex) -> Vec<i64> {
    let mut it = index.it_first();
    let mut out = vec![];
    let mut cur = it.data();
    while let Some(r) = cur {
        out.push(key_of(&r));
        cur = it.next();
    }
    out
}

fn collect_rev(index: &RbtIndex) -> Vec<i64> {
    let mut it = index.it_last();
    let mut out = vec![];
    let mut cur = it.data();
    while let Some(r) = cur {
        out.push(key_of(&r));
        cur = it.prev();
    }
    out
}

#[test]
fn test_rbt_drop_duplicates() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, true);

    let adds: Vec<bool> = [5_i64, 3, 8, 3, 1]
        .iter()
        .enumerate()
        .map(|(i, k)| index.add(&rec(i as u64, *k)))
        .collect();
    assert_eq!(adds, vec![true, true, true, false, true]);

    assert_eq!(index.len(), 4);
    index.validate().unwrap();
    assert_eq!(collect_fwd(&index), vec![1, 3, 5, 8]);
    assert_eq!(collect_rev(&index), vec![8, 5, 3, 1]);

    let out = sink();
    index.query_eq(&3_i64.to_ne_bytes(), &out).unwrap();
    assert_eq!(out.len(), 1);
}

#[test]
fn test_rbt_retain_duplicates() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, false);

    for (i, k) in [5_i64, 3, 8, 3, 1].iter().enumerate() {
        assert!(index.add(&rec(i as u64, *k)));
    }

    assert_eq!(index.len(), 5);
    index.validate().unwrap();
    assert_eq!(collect_fwd(&index), vec![1, 3, 3, 5, 8]);
    assert_eq!(collect_rev(&index), vec![8, 5, 3, 3, 1]);

    // the two 3s walk in insertion (address) order
    let mut it = index.it_lookup(&3_i64.to_ne_bytes(), 0);
    let first = it.data().unwrap();
    let second = it.next().unwrap();
    assert_eq!((key_of(&first), first.to_addr().to_u64()), (3, 1));
    assert_eq!((key_of(&second), second.to_addr().to_u64()), (3, 3));

    let out = sink();
    index.query_eq(&3_i64.to_ne_bytes(), &out).unwrap();
    assert_eq!(out.len(), 2);
}

#[test]
fn test_rbt_random_inserts() {
    let mut rng = StdRng::seed_from_u64(0);

    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, true);
    let mut n_added = 0;
    for i in 0..100_i64 {
        let key = i + rng.gen_range(0..=200) - 100;
        if index.add(&rec(i as u64, key)) {
            n_added += 1;
        }
    }

    index.validate().unwrap();
    assert_eq!(index.len(), n_added);

    let keys = collect_fwd(&index);
    assert_eq!(keys.len(), n_added);
    for w in keys.windows(2) {
        assert!(w[0] < w[1], "{} < {}", w[0], w[1]);
    }
}

#[test]
fn test_rbt_duplicate_group_walk() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, false);

    // one key, many handles
    let n = 17;
    for i in 0..n {
        index.add(&rec(i, 42));
    }
    index.add(&rec(100, 1));
    index.add(&rec(101, 90));

    assert_eq!(index.len(), (n + 2) as usize);
    index.validate().unwrap();

    let keys = collect_fwd(&index);
    assert_eq!(keys.len(), (n + 2) as usize);
    assert_eq!(keys.iter().filter(|k| **k == 42).count(), n as usize);

    let rev = collect_rev(&index);
    let mut back = rev.clone();
    back.reverse();
    assert_eq!(back, keys);
}

#[test]
fn test_rbt_lookup_directions() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, true);
    for (i, k) in [10_i64, 20, 30, 40].iter().enumerate() {
        index.add(&rec(i as u64, *k));
    }

    // exact probe
    let it = index.it_lookup(&20_i64.to_ne_bytes(), 0);
    assert_eq!(key_of(&it.data().unwrap()), 20);

    // missing probe, exact match requested
    let it = index.it_lookup(&25_i64.to_ne_bytes(), 0);
    assert!(it.data().is_none());

    // successor / predecessor of a missing probe
    let it = index.it_lookup(&25_i64.to_ne_bytes(), 1);
    assert_eq!(key_of(&it.data().unwrap()), 30);
    let it = index.it_lookup(&25_i64.to_ne_bytes(), -1);
    assert_eq!(key_of(&it.data().unwrap()), 20);

    // successor / predecessor of a present probe skip the key itself
    let it = index.it_lookup(&20_i64.to_ne_bytes(), 1);
    assert_eq!(key_of(&it.data().unwrap()), 30);
    let it = index.it_lookup(&20_i64.to_ne_bytes(), -1);
    assert_eq!(key_of(&it.data().unwrap()), 10);

    // off both ends
    let it = index.it_lookup(&5_i64.to_ne_bytes(), -1);
    assert!(it.data().is_none());
    let it = index.it_lookup(&45_i64.to_ne_bytes(), 1);
    assert!(it.data().is_none());
}

#[test]
fn test_rbt_query_ranges() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, false);
    for (i, k) in [10_i64, 20, 20, 30, 40].iter().enumerate() {
        index.add(&rec(i as u64, *k));
    }

    let out = sink();
    index.query_lt(&30_i64.to_ne_bytes(), &out).unwrap();
    assert_eq!(out.len(), 3); // 10, 20, 20

    let out = sink();
    index.query_gt(&20_i64.to_ne_bytes(), &out).unwrap();
    assert_eq!(out.len(), 2); // 30, 40

    let out = sink();
    let odd = |data: &[u8]| {
        let mut b = [0_u8; 8];
        b.copy_from_slice(data);
        i64::from_ne_bytes(b) % 20 != 0
    };
    index.query(&odd, &out).unwrap();
    assert_eq!(out.len(), 2); // 10, 30
}

#[test]
fn test_rbt_remove() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, false);
    let recs: Vec<Rec> = [7_i64, 7, 3, 9]
        .iter()
        .enumerate()
        .map(|(i, k)| rec(i as u64, *k))
        .collect();
    for r in recs.iter() {
        index.add(r);
    }
    assert_eq!(index.len(), 4);

    // removal matches key and handle address
    assert!(index.remove(&recs[1]));
    assert!(!index.remove(&recs[1]));
    assert_eq!(index.len(), 3);
    index.validate().unwrap();

    assert!(index.remove(&recs[0]));
    assert!(index.remove(&recs[2]));
    assert!(index.remove(&recs[3]));
    assert_eq!(index.len(), 0);
    assert!(index.it_first().data().is_none());
}

#[test]
fn test_rbt_exhausted_iterator_stays_exhausted() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, true);
    index.add(&rec(0, 1));

    let mut it = index.it_first();
    assert!(it.data().is_some());
    assert!(it.next().is_none());
    assert!(it.next().is_none());
    assert!(it.prev().is_none());
    assert!(it.data().is_none());
}

#[test]
fn test_rbt_black_height() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, true);
    let n = 1_024_u64;
    for i in 0..n {
        index.add(&rec(i, i as i64));
    }

    // red-black bound: black height within log2(n+1), counting the nil
    // level
    let bh = index.validate().unwrap();
    assert!(bh >= 4 && bh <= 12, "black height {}", bh);
}

#[test]
fn test_rbt_fwd_adaptor() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, true);
    for (i, k) in [5_i64, 3, 8, 1].iter().enumerate() {
        index.add(&rec(i as u64, *k));
    }

    let keys: Vec<i64> = index.it_first().into_fwd().map(|r| key_of(&r)).collect();
    assert_eq!(keys, vec![1, 3, 5, 8]);

    let tail: Vec<i64> = index
        .it_lookup(&4_i64.to_ne_bytes(), 1)
        .into_fwd()
        .map(|r| key_of(&r))
        .collect();
    assert_eq!(tail, vec![5, 8]);
}

#[test]
fn test_rbt_purge() {
    let index = RbtIndex::new("t", 0, Arc::new(CmpI64), None, true);
    for i in 0..50 {
        index.add(&rec(i, i as i64));
    }
    index.purge();
    assert_eq!(index.len(), 0);
    assert!(index.it_first().data().is_none());

    index.add(&rec(0, 5));
    assert_eq!(index.len(), 1);
}
