use rand::{prelude::random, rngs::StdRng, Rng, SeedableRng};

use super::*;

use std::{collections::BTreeMap, path};

use crate::db::CmpI64;
use crate::index::Iter;

fn bytes_of(k: i64) -> [u8; 8] {
    k.to_ne_bytes()
}

fn key_of(r: &Rec) -> i64 {
    let mut b = [0_u8; 8];
    b.copy_from_slice(r.as_bytes());
    i64::from_ne_bytes(b)
}

fn collect(mut it: Iter) -> Vec<i64> {
    let mut out = vec![];
    let mut cur = it.data();
    while let Some(r) = cur {
        out.push(key_of(&r));
        cur = it.next();
    }
    out
}

fn tmp_base(name: &str) -> path::PathBuf {
    let mut loc = std::env::temp_dir();
    loc.push(format!("odb-store-test-{}-{}", std::process::id(), name));
    loc
}

#[test]
fn test_bank_add_get() {
    let store = DataStore::open("t", Config::new(Mode::Bank, 8).set_cap(4)).unwrap();

    let mut recs = vec![];
    for k in 0..10_i64 {
        recs.push(store.add(&bytes_of(k)).unwrap());
    }
    assert_eq!(store.len(), 10);

    // addresses are dense slot ordinals across banks
    for (i, r) in recs.iter().enumerate() {
        assert_eq!(r.to_addr().to_u64(), i as u64);
        let held = store.get_at(i as u64).unwrap();
        assert_eq!(key_of(&held), i as i64);
    }
    assert!(store.get_at(10).is_none());

    // wrong length is rejected, store unchanged
    assert!(store.add(&[1, 2, 3]).is_err());
    assert_eq!(store.len(), 10);
}

#[test]
fn test_bank_free_list_reuse() {
    let store = DataStore::open("t", Config::new(Mode::Bank, 8).set_cap(4)).unwrap();

    let recs: Vec<Rec> = (0..6_i64).map(|k| store.add(&bytes_of(k)).unwrap()).collect();

    assert!(store.remove_addr(&recs[2]));
    assert!(!store.remove_addr(&recs[2]));
    assert_eq!(store.len(), 5);
    assert!(store.get_at(2).is_none());

    // the freed slot is re-issued
    let r = store.add(&bytes_of(99)).unwrap();
    assert_eq!(r.to_addr().to_u64(), 2);
    assert_eq!(store.len(), 6);
}

#[test]
fn test_max_records() {
    let config = Config::new(Mode::Bank, 8).set_max_records(3);
    let store = DataStore::open("t", config).unwrap();

    for k in 0..3_i64 {
        store.add(&bytes_of(k)).unwrap();
    }
    match store.add(&bytes_of(3)) {
        Err(Error::StoreFull(_, _)) => (),
        res => panic!("unexpected {:?}", res.map(|r| r.to_addr())),
    }
    assert_eq!(store.len(), 3);
}

#[test]
fn test_index_publication() {
    let store = DataStore::open("t", Config::new(Mode::Bank, 8)).unwrap();
    let index = store.new_rbt_index("by-key", Arc::new(CmpI64), None, true);

    for k in [5_i64, 3, 8, 1].iter() {
        store.add(&bytes_of(*k)).unwrap();
    }

    // visible in the index as soon as add returns
    assert_eq!(index.len(), 4);
    assert_eq!(collect(index.it_first()), vec![1, 3, 5, 8]);
    index.validate().unwrap();

    // a late index is populated from current contents
    let late = store.new_rbt_index("late", Arc::new(CmpI64), None, true);
    assert_eq!(late.len(), 4);
    assert_eq!(collect(late.it_first()), vec![1, 3, 5, 8]);
    assert_eq!(late.ident(), 1);
}

#[test]
fn test_populate_list_index() {
    let store = DataStore::open("t", Config::new(Mode::List, 8)).unwrap();
    for k in [9_i64, 2, 7].iter() {
        store.add(&bytes_of(*k)).unwrap();
    }

    let index = store.new_list_index("by-key", Arc::new(CmpI64), None, true);
    assert_eq!(index.len(), 3);
    assert_eq!(collect(index.it_first()), vec![2, 7, 9]);
}

#[test]
fn test_prune_sweep() {
    env_logger::try_init().ok();

    let even = |data: &[u8]| {
        let mut b = [0_u8; 8];
        b.copy_from_slice(data);
        i64::from_ne_bytes(b) % 2 == 0
    };
    let config = Config::new(Mode::Bank, 8).set_cap(64);
    let store = DataStore::open_with("t", config, Some(Box::new(even)), None, None).unwrap();
    let index = store.new_rbt_index("by-key", Arc::new(CmpI64), None, true);

    for k in 0..1000_i64 {
        store.add(&bytes_of(k)).unwrap();
    }
    assert_eq!(store.len(), 1000);

    let n = store.sweep().unwrap();
    assert_eq!(n, 500);
    assert_eq!(store.len(), 500);
    assert_eq!(index.len(), 500);
    index.validate().unwrap();

    let keys = collect(index.it_first());
    assert_eq!(keys.len(), 500);
    assert!(keys.iter().all(|k| k % 2 == 1));

    // relocated handles still answer point queries
    let out = store.clone_indirect("res");
    index.query_eq(&bytes_of(999), &out).unwrap();
    assert_eq!(out.len(), 1);

    // sweeping again with no intervening adds is a no-op
    assert_eq!(store.sweep().unwrap(), 0);
    assert_eq!(store.len(), 500);
    assert_eq!(index.len(), 500);
}

#[test]
fn test_sweep_compacts_banks() {
    let prune_low = |data: &[u8]| {
        let mut b = [0_u8; 8];
        b.copy_from_slice(data);
        i64::from_ne_bytes(b) < 900
    };
    let config = Config::new(Mode::Bank, 8).set_cap(16);
    let store = DataStore::open_with("t", config, Some(Box::new(prune_low)), None, None).unwrap();

    for k in 0..1000_i64 {
        store.add(&bytes_of(k)).unwrap();
    }
    store.sweep().unwrap();
    assert_eq!(store.len(), 100);

    // survivors compacted into the low slots
    for i in 0..100_u64 {
        let r = store.get_at(i).unwrap();
        assert!(key_of(&r) >= 900);
    }
    assert!(store.get_at(100).is_none());

    // fresh adds land right after the compacted tail
    let r = store.add(&bytes_of(1)).unwrap();
    assert_eq!(r.to_addr().to_u64(), 100);
}

#[test]
fn test_list_store_sweep() {
    let even = |data: &[u8]| {
        let mut b = [0_u8; 8];
        b.copy_from_slice(data);
        i64::from_ne_bytes(b) % 2 == 0
    };
    let config = Config::new(Mode::List, 8);
    let store = DataStore::open_with("t", config, Some(Box::new(even)), None, None).unwrap();
    let index = store.new_rbt_index("by-key", Arc::new(CmpI64), None, true);

    for k in 0..100_i64 {
        store.add(&bytes_of(k)).unwrap();
    }

    let marks = store.remove_sweep();
    assert_eq!(marks.pruned.len(), 50);
    assert!(marks.moved.is_empty()); // no relocation for list stores
    store.remove_cleanup(&marks).unwrap();

    assert_eq!(store.len(), 50);
    assert_eq!(index.len(), 50);
    assert!(collect(index.it_first()).iter().all(|k| k % 2 == 1));
}

#[test]
fn test_variable_store() {
    let len_fn: LenFn = Box::new(|data: &[u8]| data[0] as usize);
    let config = Config::new(Mode::ListVariable, 0);
    let store = DataStore::open_with("t", config, None, Some(len_fn), None).unwrap();

    let r = store.add(&[3, b'a', b'b', b'c', b'd', b'e']).unwrap();
    assert_eq!(r.as_bytes(), &[3, b'a', b'b']);

    let r = store.add(&[200, 1, 2]).unwrap(); // length fn overshoots
    assert_eq!(r.len(), 3);
}

#[test]
fn test_indirect_child_store() {
    let store = DataStore::open("t", Config::new(Mode::Bank, 8)).unwrap();
    let index = store.new_rbt_index("by-key", Arc::new(CmpI64), None, true);
    for k in 0..10_i64 {
        store.add(&bytes_of(k)).unwrap();
    }

    let out = store.clone_indirect("res");
    assert!(out.as_parent().is_some());

    index.query_gt(&bytes_of(6), &out).unwrap();
    assert_eq!(out.len(), 3);

    // the sink shares payloads rather than copying
    let r = out.get_at(0).unwrap();
    assert_eq!(key_of(&r), 7);

    // parent unaffected
    assert_eq!(store.len(), 10);
}

#[test]
fn test_archive_on_sweep() {
    let base = tmp_base("archive-sweep");
    std::fs::remove_file(base.with_extension("dat")).ok();
    std::fs::remove_file(base.with_extension("ind")).ok();

    let archive = AppendOnlyFile::create(base.as_os_str()).unwrap();
    let all = |_: &[u8]| true;
    let config = Config::new(Mode::Bank, 8);
    let store =
        DataStore::open_with("t", config, Some(Box::new(all)), None, Some(archive)).unwrap();

    for k in 0..4_i64 {
        store.add(&bytes_of(k)).unwrap();
    }
    assert_eq!(store.sweep().unwrap(), 4);
    assert_eq!(store.len(), 0);

    let dat = std::fs::read(base.with_extension("dat")).unwrap();
    assert_eq!(dat.len(), 32); // 4 records, 8 bytes each
    let ind = std::fs::read(base.with_extension("ind")).unwrap();
    assert_eq!(ind.len(), 32); // 4 offsets

    std::fs::remove_file(base.with_extension("dat")).ok();
    std::fs::remove_file(base.with_extension("ind")).ok();
}

#[test]
fn test_age_expiry_config() {
    // max_age alone; nothing is old enough to prune right away
    let config = Config::new(Mode::Bank, 8).set_max_age(3600);
    let store = DataStore::open("t", config).unwrap();
    for k in 0..10_i64 {
        store.add(&bytes_of(k)).unwrap();
    }
    assert_eq!(store.sweep().unwrap(), 0);
    assert_eq!(store.len(), 10);
}

#[test]
fn test_store_model() {
    let seed: u64 = random();
    // let seed: u64 = 14556812432717593903;
    println!("test_store_model seed {}", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let even = |data: &[u8]| {
        let mut b = [0_u8; 8];
        b.copy_from_slice(data);
        i64::from_ne_bytes(b) % 2 == 0
    };
    let config = Config::new(Mode::Bank, 8).set_cap(8);
    let store = DataStore::open_with("t", config, Some(Box::new(even)), None, None).unwrap();
    let index = store.new_rbt_index("by-key", Arc::new(CmpI64), None, false);

    // model counts per key; even keys vanish at the next sweep
    let mut model: BTreeMap<i64, usize> = BTreeMap::new();

    for _round in 0..20 {
        for _i in 0..rng.gen_range(10..100) {
            let key: i64 = rng.gen_range(-50..50);
            store.add(&bytes_of(key)).unwrap();
            *model.entry(key).or_insert(0) += 1;
        }

        store.sweep().unwrap();
        model.retain(|k, _| k % 2 != 0);

        let n: usize = model.values().sum();
        assert_eq!(store.len(), n);
        assert_eq!(index.len(), n);
        index.validate().unwrap();

        let keys = collect(index.it_first());
        let expect: Vec<i64> = model
            .iter()
            .flat_map(|(k, n)| std::iter::repeat(*k).take(*n))
            .collect();
        assert_eq!(keys, expect);
    }
}

#[test]
fn test_remove_at() {
    let store = DataStore::open("t", Config::new(Mode::Bank, 8)).unwrap();
    let index = store.new_rbt_index("by-key", Arc::new(CmpI64), None, true);
    for k in 0..4_i64 {
        store.add(&bytes_of(k)).unwrap();
    }

    assert!(store.remove_at(2));
    assert!(!store.remove_at(2));
    assert!(!store.remove_at(100));
    assert_eq!(store.len(), 3);

    // the index keeps the handle until the next sweep drops it
    assert_eq!(index.len(), 4);
    store.sweep().unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(collect(index.it_first()), vec![0, 1, 3]);
    index.validate().unwrap();

    let out = store.clone_indirect("res");
    index.query_eq(&bytes_of(2), &out).unwrap();
    assert!(out.is_empty());
}

#[test]
fn test_remove_addr_list_store() {
    let store = DataStore::open("t", Config::new(Mode::List, 8)).unwrap();
    let index = store.new_list_index("by-key", Arc::new(CmpI64), None, true);
    let recs: Vec<Rec> = (0..4_i64).map(|k| store.add(&bytes_of(k)).unwrap()).collect();

    assert!(store.remove_addr(&recs[1]));
    assert_eq!(store.len(), 3);
    assert_eq!(index.len(), 4);

    store.sweep().unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(collect(index.it_first()), vec![0, 2, 3]);

    // a second sweep has nothing left to drain
    store.sweep().unwrap();
    assert_eq!(index.len(), 3);
}

#[test]
fn test_concurrent_adds() {
    let store = DataStore::open("t", Config::new(Mode::Bank, 8).set_cap(64)).unwrap();
    let index = store.new_rbt_index("by-key", Arc::new(CmpI64), None, false);

    let n_threads = 8_i64;
    let n_adds = 500_i64;

    let mut handles = vec![];
    for t in 0..n_threads {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            for i in 0..n_adds {
                store.add(&bytes_of(t * n_adds + i)).unwrap();
            }
        }));
    }
    for handle in handles.into_iter() {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), (n_threads * n_adds) as usize);
    assert_eq!(index.len(), (n_threads * n_adds) as usize);
    index.validate().unwrap();

    let keys = collect(index.it_first());
    assert_eq!(keys.len(), (n_threads * n_adds) as usize);
    for w in keys.windows(2) {
        assert!(w[0] < w[1]);
    }
}

#[test]
fn test_sweep_on_scheduler() {
    let even = |data: &[u8]| {
        let mut b = [0_u8; 8];
        b.copy_from_slice(data);
        i64::from_ne_bytes(b) % 2 == 0
    };
    let config = Config::new(Mode::Bank, 8);
    let store = DataStore::open_with("t", config, Some(Box::new(even)), None, None).unwrap();
    for k in 0..100_i64 {
        store.add(&bytes_of(k)).unwrap();
    }

    let scheduler = crate::Scheduler::new("sweeps", 2);
    store.sweep_on(&scheduler).unwrap();
    store.sweep_on(&scheduler).unwrap(); // same class, runs after the first
    scheduler.block_until_done();

    assert_eq!(store.len(), 50);
    assert_eq!(scheduler.num_complete(), 2);
}

#[test]
fn test_background_sweeper() {
    let even = |data: &[u8]| {
        let mut b = [0_u8; 8];
        b.copy_from_slice(data);
        i64::from_ne_bytes(b) % 2 == 0
    };
    let config = Config::new(Mode::Bank, 8).set_sleep_ms(20);
    let store = DataStore::open_with("t", config, Some(Box::new(even)), None, None).unwrap();

    for k in 0..100_i64 {
        store.add(&bytes_of(k)).unwrap();
    }

    for _ in 0..100 {
        if store.len() == 50 {
            break;
        }
        std::thread::sleep(time::Duration::from_millis(10));
    }
    assert_eq!(store.len(), 50);
}
