//! Module `index` implement ordered views over datastore handles.
//!
//! An index never owns record bytes, it carries [Rec] handles issued by
//! the datastore that created it. Two concrete shapes are provided,
//!
//! * [RbtIndex], a red-black tree, the general workhorse.
//! * [ListIndex], a sorted singly-linked list, the simplest shape.
//!
//! Every mutating operation acquires the index's writer latch; every
//! iterator acquires the reader latch on construction and releases it
//! on drop.

use crate::db::{Condition, Rec};
use crate::store::{DataStore, Markset};
use crate::Result;

mod group;
mod list;
mod rbt;

pub use group::IndexGroup;
pub use list::{ListIndex, ListIter};
pub use rbt::{RbtIndex, RbtIter};

/// Ident reserved for internal, duplicate-subtree indexes.
pub const INTERNAL_IDENT: i64 = -1;

/// Operations common to every index shape.
///
/// Queries sink matching records into `out`, a datastore that typically
/// is an indirect child of the indexed store; they never fail, a miss
/// produces an empty sink.
pub trait Index: Send + Sync {
    /// Integer distinguishing indexes owned by the same datastore.
    fn ident(&self) -> i64;

    fn to_name(&self) -> String;

    /// Number of keys held; duplicate handles under one key count once
    /// per handle.
    fn len(&self) -> usize;

    /// Add a handle. Return true when a new key was inserted, false
    /// when the handle merged with, or was dropped against, an existing
    /// equal key.
    fn add(&self, rec: &Rec) -> bool;

    /// Fast-path add used by [DataStore::populate]; data integrity is
    /// already guaranteed by the caller, the result is not inspected.
    fn add_fast(&self, rec: &Rec);

    /// Remove a handle, matching key and handle address. Return false
    /// when no such handle is held.
    fn remove(&self, rec: &Rec) -> bool;

    /// Drop every handle.
    fn purge(&self);

    /// Sink every record satisfying `cond` into `out`, in key order.
    fn query(&self, cond: &dyn Condition, out: &DataStore) -> Result<()>;

    /// Sink every record whose key equals `key` into `out`.
    fn query_eq(&self, key: &[u8], out: &DataStore) -> Result<()>;

    /// Sink every record with key less than `key` into `out`.
    fn query_lt(&self, key: &[u8], out: &DataStore) -> Result<()>;

    /// Sink every record with key greater than `key` into `out`.
    fn query_gt(&self, key: &[u8], out: &DataStore) -> Result<()>;

    fn it_first(&self) -> Iter;

    fn it_last(&self) -> Iter;

    /// Position an iterator relative to `key`: `dir` negative for the
    /// predecessor, `0` for an exact match, positive for the successor.
    fn it_lookup(&self, key: &[u8], dir: i8) -> Iter;

    /// Drop every handle the sweep pruned.
    fn remove_sweep(&self, marks: &Markset);

    /// Re-key every handle the sweep relocated.
    fn update(&self, marks: &Markset);
}

/// Bidirectional iterator over an index, holding the index's reader
/// latch for its lifetime.
///
/// An exhausted iterator stays exhausted: `next` and `prev` keep
/// returning `None` and `data` stays clear.
pub enum Iter<'a> {
    Rbt(RbtIter<'a>),
    List(ListIter<'a>),
}

impl<'a> Iter<'a> {
    /// Step forward in comparator order. Return the record stepped to.
    pub fn next(&mut self) -> Option<Rec> {
        match self {
            Iter::Rbt(it) => it.next(),
            Iter::List(it) => it.next(),
        }
    }

    /// Step backward. List indexes are singly linked and do not support
    /// backward iteration; their iterators return `None`.
    pub fn prev(&mut self) -> Option<Rec> {
        match self {
            Iter::Rbt(it) => it.prev(),
            Iter::List(it) => it.prev(),
        }
    }

    /// Record under the cursor, `None` once exhausted.
    pub fn data(&self) -> Option<Rec> {
        match self {
            Iter::Rbt(it) => it.data(),
            Iter::List(it) => it.data(),
        }
    }

    /// Adapt into a std iterator, starting at the cursor and walking
    /// forward.
    pub fn into_fwd(self) -> Fwd<'a> {
        Fwd {
            it: self,
            fresh: true,
        }
    }
}

/// Forward [std::iter::Iterator] adaptor over an [Iter].
pub struct Fwd<'a> {
    it: Iter<'a>,
    fresh: bool,
}

impl<'a> Iterator for Fwd<'a> {
    type Item = Rec;

    fn next(&mut self) -> Option<Rec> {
        if self.fresh {
            self.fresh = false;
            self.it.data()
        } else {
            self.it.next()
        }
    }
}
