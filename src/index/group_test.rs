use super::*;

use crate::db::CmpI64;
use crate::store::{Config, Mode};

fn bytes_of(k: i64) -> [u8; 8] {
    k.to_ne_bytes()
}

#[test]
fn test_group_queries() {
    let s1 = DataStore::open("a", Config::new(Mode::Bank, 8)).unwrap();
    let s2 = DataStore::open("b", Config::new(Mode::Bank, 8)).unwrap();

    let i1 = s1.new_rbt_index("a-key", Arc::new(CmpI64), None, true);
    let i2 = s2.new_list_index("b-key", Arc::new(CmpI64), None, true);

    for k in [1_i64, 3, 5].iter() {
        s1.add(&bytes_of(*k)).unwrap();
    }
    for k in [3_i64, 4].iter() {
        s2.add(&bytes_of(*k)).unwrap();
    }

    let group = IndexGroup::new("both", 7);
    group.add_index(i1).add_index(i2);
    assert_eq!(group.len(), 2);
    assert_eq!(group.ident(), 7);

    let out = s1.clone_indirect("res");
    group.query_eq(&bytes_of(3), &out).unwrap();
    assert_eq!(out.len(), 2); // once from each member

    let out = s1.clone_indirect("res");
    group.query_gt(&bytes_of(3), &out).unwrap();
    assert_eq!(out.len(), 2); // 5 from the tree, 4 from the list

    let out = s1.clone_indirect("res");
    group.query_lt(&bytes_of(4), &out).unwrap();
    assert_eq!(out.len(), 3); // 1 and 3 from the tree, 3 from the list

    let out = s1.clone_indirect("res");
    let any = |_: &[u8]| true;
    group.query(&any, &out).unwrap();
    assert_eq!(out.len(), 5);
}

#[test]
fn test_group_add_remove() {
    let store = DataStore::open("t", Config::new(Mode::Bank, 8)).unwrap();
    let i1 = store.new_rbt_index("k1", Arc::new(CmpI64), None, true);
    let i2 = store.new_rbt_index("k2", Arc::new(CmpI64), None, true);

    let group = IndexGroup::new("pair", 0);
    group.add_index(Arc::clone(&i1) as Arc<dyn Index>);
    group.add_index(Arc::clone(&i2) as Arc<dyn Index>);

    let rec = store.add(&bytes_of(9)).unwrap();
    assert_eq!(i1.len(), 1);
    assert_eq!(i2.len(), 1);

    assert_eq!(group.remove(&rec), 2);
    assert_eq!(i1.len(), 0);
    assert_eq!(i2.len(), 0);

    group.add(&rec);
    assert_eq!(i1.len(), 1);
    assert_eq!(i2.len(), 1);
}
