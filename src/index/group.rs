//! Group of indexes queried as one.

use std::sync::Arc;

use crate::db::{Condition, Rec};
use crate::index::Index;
use crate::store::DataStore;
use crate::util::Spinlock;
use crate::Result;

/// A set of indexes addressed together: every query fans out across the
/// members, in attachment order, sinking into one shared out-store.
/// Members usually live on different datastores or key the same store
/// differently.
pub struct IndexGroup {
    name: String,
    ident: i64,
    members: Spinlock<Vec<Arc<dyn Index>>>,
}

impl IndexGroup {
    pub fn new(name: &str, ident: i64) -> IndexGroup {
        IndexGroup {
            name: name.to_string(),
            ident,
            members: Spinlock::new(Vec::default()),
        }
    }

    pub fn to_name(&self) -> String {
        self.name.clone()
    }

    pub fn ident(&self) -> i64 {
        self.ident
    }

    /// Number of member indexes.
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_index(&self, index: Arc<dyn Index>) -> &Self {
        self.members.write().push(index);
        self
    }

    /// Add a handle to every member.
    pub fn add(&self, rec: &Rec) {
        for index in self.to_members() {
            index.add(rec);
        }
    }

    /// Remove a handle from every member, return how many held it.
    pub fn remove(&self, rec: &Rec) -> usize {
        self.to_members()
            .iter()
            .filter(|index| index.remove(rec))
            .count()
    }

    pub fn query(&self, cond: &dyn Condition, out: &DataStore) -> Result<()> {
        for index in self.to_members() {
            index.query(cond, out)?;
        }
        Ok(())
    }

    pub fn query_eq(&self, key: &[u8], out: &DataStore) -> Result<()> {
        for index in self.to_members() {
            index.query_eq(key, out)?;
        }
        Ok(())
    }

    pub fn query_lt(&self, key: &[u8], out: &DataStore) -> Result<()> {
        for index in self.to_members() {
            index.query_lt(key, out)?;
        }
        Ok(())
    }

    pub fn query_gt(&self, key: &[u8], out: &DataStore) -> Result<()> {
        for index in self.to_members() {
            index.query_gt(key, out)?;
        }
        Ok(())
    }

    fn to_members(&self) -> Vec<Arc<dyn Index>> {
        self.members.read().clone()
    }
}

#[cfg(test)]
#[path = "group_test.rs"]
mod group_test;
