//! Red-black tree index over datastore handles.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::db::{Comparator, Condition, Merger, Rec};
use crate::index::{Index, Iter};
use crate::rbt::{Tree, TreeItem, NIL};
use crate::store::{DataStore, Markset};
use crate::util::spinlock::ReadGuard;
use crate::util::Spinlock;
use crate::Result;

impl TreeItem for Rec {
    fn addr(&self) -> u64 {
        self.to_addr().to_u64()
    }
}

/// Index shaped as a top-down red-black tree, refer to [Tree] for the
/// algorithm. With `drop_duplicates` false, handles comparing equal are
/// retained under one key, ordered by handle address.
pub struct RbtIndex {
    name: String,
    ident: i64,
    cmp: Arc<dyn Comparator>,
    merge: Option<Arc<dyn Merger>>,
    inner: Spinlock<Tree<Rec>>,
}

impl RbtIndex {
    pub fn new(
        name: &str,
        ident: i64,
        cmp: Arc<dyn Comparator>,
        merge: Option<Arc<dyn Merger>>,
        drop_duplicates: bool,
    ) -> RbtIndex {
        RbtIndex {
            name: name.to_string(),
            ident,
            cmp,
            merge,
            inner: Spinlock::new(Tree::new(drop_duplicates)),
        }
    }

    /// Validate red-black and sort-order invariants, return the black
    /// height of the tree.
    pub fn validate(&self) -> Result<usize> {
        let tree = self.inner.read();
        let cf = |a: &Rec, b: &Rec| self.cmp.compare(a.as_bytes(), b.as_bytes());
        tree.validate(&cf)
    }

    fn do_add(&self, rec: &Rec) -> bool {
        let cf = |a: &Rec, b: &Rec| self.cmp.compare(a.as_bytes(), b.as_bytes());

        let mg_cl;
        let mg: Option<&(dyn Fn(Rec, &Rec) -> Rec)> = match self.merge.as_ref() {
            Some(m) => {
                mg_cl = move |inc: Rec, ex: &Rec| m.merge(&inc, ex);
                Some(&mg_cl)
            }
            None => None,
        };

        let mut tree = self.inner.write();
        tree.insert(rec.clone(), &cf, mg)
    }
}

impl Index for RbtIndex {
    fn ident(&self) -> i64 {
        self.ident
    }

    fn to_name(&self) -> String {
        self.name.clone()
    }

    fn len(&self) -> usize {
        self.inner.read().len()
    }

    fn add(&self, rec: &Rec) -> bool {
        self.do_add(rec)
    }

    fn add_fast(&self, rec: &Rec) {
        self.do_add(rec);
    }

    fn remove(&self, rec: &Rec) -> bool {
        let probe = |t: &Rec| self.cmp.compare(rec.as_bytes(), t.as_bytes());
        let mut tree = self.inner.write();
        tree.remove(&probe, Some(rec.addr())).is_some()
    }

    fn purge(&self) {
        self.inner.write().purge()
    }

    fn query(&self, cond: &dyn Condition, out: &DataStore) -> Result<()> {
        let mut it = self.it_first();
        let mut cur = it.data();
        while let Some(rec) = cur {
            if cond.eval(rec.as_bytes()) {
                out.add_rec(&rec)?;
            }
            cur = it.next();
        }
        Ok(())
    }

    fn query_eq(&self, key: &[u8], out: &DataStore) -> Result<()> {
        let mut it = self.it_lookup(key, 0);
        let mut cur = it.data();
        while let Some(rec) = cur {
            if self.cmp.compare(key, rec.as_bytes()) != Ordering::Equal {
                break;
            }
            out.add_rec(&rec)?;
            cur = it.next();
        }
        Ok(())
    }

    fn query_lt(&self, key: &[u8], out: &DataStore) -> Result<()> {
        let mut it = self.it_lookup(key, -1);
        let mut cur = it.data();
        while let Some(rec) = cur {
            out.add_rec(&rec)?;
            cur = it.prev();
        }
        Ok(())
    }

    fn query_gt(&self, key: &[u8], out: &DataStore) -> Result<()> {
        let mut it = self.it_lookup(key, 1);
        let mut cur = it.data();
        while let Some(rec) = cur {
            out.add_rec(&rec)?;
            cur = it.next();
        }
        Ok(())
    }

    fn it_first(&self) -> Iter {
        let guard = self.inner.read();
        let mut it = RbtIter {
            tree: guard,
            trail: Vec::default(),
            sub: None,
            data: None,
        };

        let tree = &*it.tree;
        let root = tree.to_root();
        if root != NIL {
            seed_first(tree, root, &mut it.trail);
            let top = it.trail.last().unwrap().0;
            if tree.is_sub(top) {
                let mut st = Vec::default();
                seed_first(tree, tree.sub_root(top), &mut st);
                it.data = Some(tree.item(st.last().unwrap().0).clone());
                it.sub = Some(st);
            } else {
                it.data = Some(tree.item(top).clone());
            }
        }

        Iter::Rbt(it)
    }

    fn it_last(&self) -> Iter {
        let guard = self.inner.read();
        let mut it = RbtIter {
            tree: guard,
            trail: Vec::default(),
            sub: None,
            data: None,
        };

        let tree = &*it.tree;
        let root = tree.to_root();
        if root != NIL {
            seed_last(tree, root, &mut it.trail);
            let top = it.trail.last().unwrap().0;
            if tree.is_sub(top) {
                let mut st = Vec::default();
                seed_last(tree, tree.sub_root(top), &mut st);
                it.data = Some(tree.item(st.last().unwrap().0).clone());
                it.sub = Some(st);
            } else {
                it.data = Some(tree.item(top).clone());
            }
        }

        Iter::Rbt(it)
    }

    fn it_lookup(&self, key: &[u8], dir: i8) -> Iter {
        enum Post {
            Stay,
            Next,
            Prev,
        }

        let guard = self.inner.read();
        let mut it = RbtIter {
            tree: guard,
            trail: Vec::default(),
            sub: None,
            data: None,
        };
        let mut post = Post::Stay;

        {
            let tree = &*it.tree;
            let root = tree.to_root();
            if root != NIL {
                let mut i = root;
                let mut p = NIL;
                let mut c = Ordering::Equal;

                while i != NIL {
                    c = self.cmp.compare(key, tree.item(i).as_bytes());
                    if c == Ordering::Equal {
                        break;
                    }
                    let d = (c == Ordering::Greater) as usize;
                    it.trail.push((i, d == 1));
                    p = i;
                    i = tree.link(i, d);
                }

                if i != NIL {
                    // Exact key. For directed lookups position on the
                    // key and step once past the whole duplicate group.
                    it.trail.push((i, false));
                    if dir == 0 {
                        if tree.is_sub(i) {
                            let mut st = Vec::default();
                            seed_first(tree, tree.sub_root(i), &mut st);
                            it.data = Some(tree.item(st.last().unwrap().0).clone());
                            it.sub = Some(st);
                        } else {
                            it.data = Some(tree.item(i).clone());
                        }
                    } else {
                        it.data = Some(tree.item(i).clone());
                        post = if dir > 0 { Post::Next } else { Post::Prev };
                    }
                } else if dir != 0 {
                    // Fell off at p, the nearest key to the probe.
                    let i = p;
                    match (c, dir > 0) {
                        (Ordering::Less, false) => {
                            it.data = Some(tree.item(i).clone());
                            post = Post::Prev;
                        }
                        (Ordering::Less, true) => {
                            // p is the successor, enter at its first
                            // handle.
                            if tree.is_sub(i) {
                                let mut st = Vec::default();
                                seed_first(tree, tree.sub_root(i), &mut st);
                                it.data = Some(tree.item(st.last().unwrap().0).clone());
                                it.sub = Some(st);
                            } else {
                                it.data = Some(tree.item(i).clone());
                            }
                        }
                        (_, true) => {
                            it.data = Some(tree.item(i).clone());
                            post = Post::Next;
                        }
                        (_, false) => {
                            // p is the predecessor, enter at its last
                            // handle.
                            if tree.is_sub(i) {
                                let mut st = Vec::default();
                                seed_last(tree, tree.sub_root(i), &mut st);
                                it.data = Some(tree.item(st.last().unwrap().0).clone());
                                it.sub = Some(st);
                            } else {
                                it.data = Some(tree.item(i).clone());
                            }
                        }
                    }
                }
            }
        }

        match post {
            Post::Stay => (),
            Post::Next => {
                it.next();
            }
            Post::Prev => {
                it.prev();
            }
        }

        Iter::Rbt(it)
    }

    fn remove_sweep(&self, marks: &Markset) {
        for rec in marks.pruned.iter().chain(marks.removed.iter()) {
            self.remove(rec);
        }
    }

    fn update(&self, marks: &Markset) {
        let mut tree = self.inner.write();
        for (old, new) in marks.moved.iter() {
            let probe = |t: &Rec| self.cmp.compare(old.as_bytes(), t.as_bytes());
            tree.update_addr(&probe, old.addr(), old.rebind(*new));
        }
    }
}

/// Iterator over an [RbtIndex].
///
/// Carries a trail of `(node, taint)` entries, the path from the root
/// to the cursor. The taint remembers that the node's right subtree is
/// the part being traversed, which is what lets `next` and `prev` work
/// without parent pointers. While the cursor sits inside a duplicate
/// subtree a second trail drives the inner traversal until exhausted.
pub struct RbtIter<'a> {
    tree: ReadGuard<'a, Tree<Rec>>,
    trail: Vec<(u32, bool)>,
    sub: Option<Vec<(u32, bool)>>,
    data: Option<Rec>,
}

impl<'a> RbtIter<'a> {
    pub fn next(&mut self) -> Option<Rec> {
        self.data.as_ref()?;

        let tree = &*self.tree;

        if let Some(st) = self.sub.as_mut() {
            if let Some(n) = advance(tree, st, true) {
                self.data = Some(tree.item(n).clone());
                return self.data.clone();
            }
            self.sub = None;
        }

        match advance(tree, &mut self.trail, true) {
            Some(top) if tree.is_sub(top) => {
                let mut st = Vec::default();
                seed_first(tree, tree.sub_root(top), &mut st);
                self.data = Some(tree.item(st.last().unwrap().0).clone());
                self.sub = Some(st);
                self.data.clone()
            }
            Some(top) => {
                self.data = Some(tree.item(top).clone());
                self.data.clone()
            }
            None => {
                self.data = None;
                None
            }
        }
    }

    pub fn prev(&mut self) -> Option<Rec> {
        self.data.as_ref()?;

        let tree = &*self.tree;

        if let Some(st) = self.sub.as_mut() {
            if let Some(n) = advance(tree, st, false) {
                self.data = Some(tree.item(n).clone());
                return self.data.clone();
            }
            self.sub = None;
        }

        match advance(tree, &mut self.trail, false) {
            Some(top) if tree.is_sub(top) => {
                let mut st = Vec::default();
                seed_last(tree, tree.sub_root(top), &mut st);
                self.data = Some(tree.item(st.last().unwrap().0).clone());
                self.sub = Some(st);
                self.data.clone()
            }
            Some(top) => {
                self.data = Some(tree.item(top).clone());
                self.data.clone()
            }
            None => {
                self.data = None;
                None
            }
        }
    }

    pub fn data(&self) -> Option<Rec> {
        self.data.clone()
    }
}

// Push the path to the leftmost node under `root`, untainted.
fn seed_first(tree: &Tree<Rec>, root: u32, trail: &mut Vec<(u32, bool)>) {
    let mut curr = root;
    while curr != NIL {
        trail.push((curr, false));
        curr = tree.link(curr, 0);
    }
}

// Push the right spine under `root`, tainted.
fn seed_last(tree: &Tree<Rec>, root: u32, trail: &mut Vec<(u32, bool)>) {
    let mut curr = root;
    while curr != NIL {
        trail.push((curr, true));
        curr = tree.link(curr, 1);
    }
}

// Step the trail one node in-order, forward or backward. Return the new
// top, or None when the walk is exhausted.
fn advance(tree: &Tree<Rec>, trail: &mut Vec<(u32, bool)>, forward: bool) -> Option<u32> {
    let (top, _) = *trail.last()?;

    if forward {
        if tree.link(top, 1) != NIL {
            trail.last_mut().unwrap().1 = true;
            let mut curr = tree.link(top, 1);
            while curr != NIL {
                trail.push((curr, false));
                curr = tree.link(curr, 0);
            }
        } else {
            trail.pop();
            while matches!(trail.last(), Some((_, true))) {
                trail.pop();
            }
        }
    } else if tree.link(top, 0) != NIL {
        trail.last_mut().unwrap().1 = false;
        let mut curr = tree.link(top, 0);
        while curr != NIL {
            trail.push((curr, true));
            curr = tree.link(curr, 1);
        }
    } else {
        trail.pop();
        while matches!(trail.last(), Some((_, false))) {
            trail.pop();
        }
    }

    trail.last().map(|(n, _)| *n)
}

#[cfg(test)]
#[path = "rbt_test.rs"]
mod rbt_test;
