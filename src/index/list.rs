//! Sorted singly-linked list index, the simplest index shape.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::db::{Comparator, Condition, Merger, Rec};
use crate::index::{Index, Iter};
use crate::store::{DataStore, Markset};
use crate::util::spinlock::ReadGuard;
use crate::util::Spinlock;
use crate::Result;

const NIL: u32 = u32::MAX;

struct Ln {
    rec: Rec,
    next: u32,
}

struct Chain {
    nodes: Vec<Option<Ln>>,
    free: Vec<u32>,
    head: u32,
    count: usize,
}

impl Chain {
    fn node(&self, i: u32) -> &Ln {
        self.nodes[i as usize].as_ref().unwrap()
    }

    fn node_mut(&mut self, i: u32) -> &mut Ln {
        self.nodes[i as usize].as_mut().unwrap()
    }

    fn alloc(&mut self, rec: Rec, next: u32) -> u32 {
        match self.free.pop() {
            Some(i) => {
                self.nodes[i as usize] = Some(Ln { rec, next });
                i
            }
            None => {
                self.nodes.push(Some(Ln { rec, next }));
                (self.nodes.len() - 1) as u32
            }
        }
    }

    fn dealloc(&mut self, i: u32) {
        self.nodes[i as usize] = None;
        self.free.push(i);
    }
}

/// Index keeping its handles on a single-linked chain, sorted by the
/// comparator. Inserts walk the chain, so this shape suits small or
/// rarely-mutated views; iteration is forward only.
pub struct ListIndex {
    name: String,
    ident: i64,
    drop_duplicates: bool,
    cmp: Arc<dyn Comparator>,
    merge: Option<Arc<dyn Merger>>,
    inner: Spinlock<Chain>,
}

impl ListIndex {
    pub fn new(
        name: &str,
        ident: i64,
        cmp: Arc<dyn Comparator>,
        merge: Option<Arc<dyn Merger>>,
        drop_duplicates: bool,
    ) -> ListIndex {
        ListIndex {
            name: name.to_string(),
            ident,
            drop_duplicates,
            cmp,
            merge,
            inner: Spinlock::new(Chain {
                nodes: Vec::default(),
                free: Vec::default(),
                head: NIL,
                count: 0,
            }),
        }
    }

    fn do_add(&self, rec: &Rec) -> bool {
        let cf = |a: &Rec, b: &Rec| self.cmp.compare(a.as_bytes(), b.as_bytes());

        let mut chain = self.inner.write();

        if chain.head == NIL {
            let n = chain.alloc(rec.clone(), NIL);
            chain.head = n;
            chain.count = 1;
            return true;
        }

        // Inserting ahead of the head is special, the head pointer
        // moves.
        let comp = cf(rec, &chain.node(chain.head).rec);
        if comp != Ordering::Greater {
            if comp == Ordering::Equal {
                if let Some(m) = self.merge.as_ref() {
                    let head = chain.head;
                    let merged = m.merge(rec, &chain.node(head).rec);
                    chain.node_mut(head).rec = merged;
                    return false;
                }
                if self.drop_duplicates || chain.node(chain.head).rec.to_addr() == rec.to_addr() {
                    return false;
                }
            }
            let head = chain.head;
            let n = chain.alloc(rec.clone(), head);
            chain.head = n;
            chain.count += 1;
            return true;
        }

        // Walk until the record ahead sorts at-or-after the new one.
        let mut curr = chain.head;
        let mut comp = Ordering::Greater;
        loop {
            let nx = chain.node(curr).next;
            if nx == NIL {
                break;
            }
            comp = cf(rec, &chain.node(nx).rec);
            if comp != Ordering::Greater {
                break;
            }
            curr = nx;
        }

        if comp == Ordering::Equal {
            let nx = chain.node(curr).next;
            if let Some(m) = self.merge.as_ref() {
                let merged = m.merge(rec, &chain.node(nx).rec);
                chain.node_mut(nx).rec = merged;
                return false;
            }
            if self.drop_duplicates || chain.node(nx).rec.to_addr() == rec.to_addr() {
                return false;
            }
        }

        let nx = chain.node(curr).next;
        let n = chain.alloc(rec.clone(), nx);
        chain.node_mut(curr).next = n;
        chain.count += 1;
        true
    }

    fn matches(&self, rec: &Rec, other: &Rec) -> bool {
        self.cmp.compare(rec.as_bytes(), other.as_bytes()) == Ordering::Equal
            && (self.drop_duplicates || rec.to_addr() == other.to_addr())
    }
}

impl Index for ListIndex {
    fn ident(&self) -> i64 {
        self.ident
    }

    fn to_name(&self) -> String {
        self.name.clone()
    }

    fn len(&self) -> usize {
        self.inner.read().count
    }

    fn add(&self, rec: &Rec) -> bool {
        self.do_add(rec)
    }

    fn add_fast(&self, rec: &Rec) {
        self.do_add(rec);
    }

    fn remove(&self, rec: &Rec) -> bool {
        let mut chain = self.inner.write();

        if chain.head == NIL {
            return false;
        }

        if self.matches(rec, &chain.node(chain.head).rec) {
            let head = chain.head;
            let nx = chain.node(head).next;
            chain.head = nx;
            chain.dealloc(head);
            chain.count -= 1;
            return true;
        }

        let mut curr = chain.head;
        loop {
            let nx = chain.node(curr).next;
            if nx == NIL {
                return false;
            }
            if self.matches(rec, &chain.node(nx).rec) {
                let nn = chain.node(nx).next;
                chain.node_mut(curr).next = nn;
                chain.dealloc(nx);
                chain.count -= 1;
                return true;
            }
            curr = nx;
        }
    }

    fn purge(&self) {
        let mut chain = self.inner.write();
        chain.nodes.clear();
        chain.free.clear();
        chain.head = NIL;
        chain.count = 0;
    }

    fn query(&self, cond: &dyn Condition, out: &DataStore) -> Result<()> {
        let chain = self.inner.read();
        let mut curr = chain.head;
        while curr != NIL {
            let rec = &chain.node(curr).rec;
            if cond.eval(rec.as_bytes()) {
                out.add_rec(rec)?;
            }
            curr = chain.node(curr).next;
        }
        Ok(())
    }

    fn query_eq(&self, key: &[u8], out: &DataStore) -> Result<()> {
        let chain = self.inner.read();
        let mut curr = chain.head;
        while curr != NIL {
            let rec = &chain.node(curr).rec;
            match self.cmp.compare(key, rec.as_bytes()) {
                Ordering::Greater => (),
                Ordering::Equal => {
                    out.add_rec(rec)?;
                }
                Ordering::Less => break,
            }
            curr = chain.node(curr).next;
        }
        Ok(())
    }

    fn query_lt(&self, key: &[u8], out: &DataStore) -> Result<()> {
        let chain = self.inner.read();
        let mut curr = chain.head;
        while curr != NIL {
            let rec = &chain.node(curr).rec;
            if self.cmp.compare(key, rec.as_bytes()) != Ordering::Greater {
                break;
            }
            out.add_rec(rec)?;
            curr = chain.node(curr).next;
        }
        Ok(())
    }

    fn query_gt(&self, key: &[u8], out: &DataStore) -> Result<()> {
        let chain = self.inner.read();
        let mut curr = chain.head;
        while curr != NIL {
            let rec = &chain.node(curr).rec;
            if self.cmp.compare(key, rec.as_bytes()) == Ordering::Less {
                out.add_rec(rec)?;
            }
            curr = chain.node(curr).next;
        }
        Ok(())
    }

    fn it_first(&self) -> Iter {
        let guard = self.inner.read();
        let cursor = guard.head;
        let data = match cursor {
            NIL => None,
            _ => Some(guard.node(cursor).rec.clone()),
        };
        Iter::List(ListIter {
            chain: guard,
            cursor,
            data,
        })
    }

    fn it_last(&self) -> Iter {
        let guard = self.inner.read();
        let mut cursor = guard.head;
        while cursor != NIL && guard.node(cursor).next != NIL {
            cursor = guard.node(cursor).next;
        }
        let data = match cursor {
            NIL => None,
            _ => Some(guard.node(cursor).rec.clone()),
        };
        Iter::List(ListIter {
            chain: guard,
            cursor,
            data,
        })
    }

    fn it_lookup(&self, key: &[u8], dir: i8) -> Iter {
        let guard = self.inner.read();

        let mut hit = NIL;
        let mut curr = guard.head;
        while curr != NIL {
            match self.cmp.compare(key, guard.node(curr).rec.as_bytes()) {
                Ordering::Greater => {
                    if dir < 0 {
                        hit = curr; // best predecessor so far
                    }
                }
                Ordering::Equal => {
                    if dir == 0 {
                        hit = curr;
                    }
                    if dir <= 0 {
                        break;
                    }
                }
                Ordering::Less => {
                    if dir > 0 {
                        hit = curr;
                    }
                    break;
                }
            }
            curr = guard.node(curr).next;
        }

        let data = match hit {
            NIL => None,
            _ => Some(guard.node(hit).rec.clone()),
        };
        Iter::List(ListIter {
            chain: guard,
            cursor: hit,
            data,
        })
    }

    fn remove_sweep(&self, marks: &Markset) {
        let mut addrs: Vec<u64> = marks
            .pruned
            .iter()
            .chain(marks.removed.iter())
            .map(|r| r.to_addr().to_u64())
            .collect();
        addrs.sort_unstable();

        let mut chain = self.inner.write();

        while chain.head != NIL {
            let head = chain.head;
            let a = chain.node(head).rec.to_addr().to_u64();
            if addrs.binary_search(&a).is_err() {
                break;
            }
            let nx = chain.node(head).next;
            chain.head = nx;
            chain.dealloc(head);
            chain.count -= 1;
        }

        if chain.head == NIL {
            return;
        }

        let mut curr = chain.head;
        loop {
            let nx = chain.node(curr).next;
            if nx == NIL {
                break;
            }
            let a = chain.node(nx).rec.to_addr().to_u64();
            if addrs.binary_search(&a).is_ok() {
                let nn = chain.node(nx).next;
                chain.node_mut(curr).next = nn;
                chain.dealloc(nx);
                chain.count -= 1;
            } else {
                curr = nx;
            }
        }
    }

    fn update(&self, marks: &Markset) {
        let mut moved: Vec<(u64, Rec)> = marks
            .moved
            .iter()
            .map(|(old, new)| (old.to_addr().to_u64(), old.rebind(*new)))
            .collect();
        moved.sort_unstable_by_key(|(a, _)| *a);

        let mut chain = self.inner.write();
        let mut curr = chain.head;
        while curr != NIL {
            let a = chain.node(curr).rec.to_addr().to_u64();
            if let Ok(i) = moved.binary_search_by_key(&a, |(a, _)| *a) {
                chain.node_mut(curr).rec = moved[i].1.clone();
            }
            curr = chain.node(curr).next;
        }
    }
}

/// Iterator over a [ListIndex], forward only.
pub struct ListIter<'a> {
    chain: ReadGuard<'a, Chain>,
    cursor: u32,
    data: Option<Rec>,
}

impl<'a> ListIter<'a> {
    pub fn next(&mut self) -> Option<Rec> {
        self.data.as_ref()?;

        self.cursor = self.chain.node(self.cursor).next;
        match self.cursor {
            NIL => {
                self.data = None;
                None
            }
            _ => {
                self.data = Some(self.chain.node(self.cursor).rec.clone());
                self.data.clone()
            }
        }
    }

    /// Single-linked chains cannot walk backward.
    pub fn prev(&mut self) -> Option<Rec> {
        None
    }

    pub fn data(&self) -> Option<Rec> {
        self.data.clone()
    }
}

#[cfg(test)]
#[path = "list_test.rs"]
mod list_test;
