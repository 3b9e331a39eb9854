//! Module `db` define the data-model shared by datastores and indexes.
//!
//! A record is an opaque byte sequence owned by a [DataStore], addressed
//! by a stable [Addr] handle. Indexes never look inside a record except
//! through a caller supplied [Comparator] or [Condition].
//!
//! [DataStore]: crate::store::DataStore

use std::{fmt, result, sync::Arc};

mod cmp;

pub use cmp::{CmpAt, CmpBy, CmpBytes, CmpF32, CmpF64, CmpStr};
pub use cmp::{CmpI16, CmpI32, CmpI64, CmpI8, CmpU16, CmpU32, CmpU64, CmpU8};
pub use cmp::{Comparator, Condition, Merger};

/// Stable handle to a record's storage slot within a datastore.
///
/// Handles are valid until the record is swept or the datastore is
/// dropped. A swept record's slot can be re-issued to a later add.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(u64);

impl Addr {
    /// Sentinel value standing for "no record".
    pub const NULL: Addr = Addr(u64::MAX);

    pub fn new(slot: u64) -> Addr {
        Addr(slot)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == u64::MAX
    }

    #[inline]
    pub fn to_u64(&self) -> u64 {
        self.0
    }

    /// Break the handle into (bank, slot) for a bank of `cap` records.
    #[inline]
    pub fn to_bank(&self, cap: u64) -> (usize, usize) {
        ((self.0 / cap) as usize, (self.0 % cap) as usize)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        if self.is_null() {
            write!(f, "addr:null")
        } else {
            write!(f, "addr:{:x}", self.0)
        }
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

/// Record handle, cheap to clone.
///
/// Holds the slot address, the record bytes and the timestamp stamped
/// by the datastore at add time, in seconds since the store's epoch.
/// Bytes are shared read-only across every index that carries the
/// handle; only the owning datastore re-binds addresses, during sweep
/// compaction.
#[derive(Clone)]
pub struct Rec {
    addr: Addr,
    data: Arc<[u8]>,
    ts: u64,
}

impl Rec {
    pub fn new(addr: Addr, data: Arc<[u8]>, ts: u64) -> Rec {
        Rec { addr, data, ts }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn to_addr(&self) -> Addr {
        self.addr
    }

    /// Timestamp in seconds since the owning store's epoch.
    #[inline]
    pub fn to_seconds(&self) -> u64 {
        self.ts
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Share the underlying payload.
    pub fn to_payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Same payload, new slot address. Used by sweep compaction.
    pub fn rebind(&self, addr: Addr) -> Rec {
        Rec {
            addr,
            data: Arc::clone(&self.data),
            ts: self.ts,
        }
    }
}

impl fmt::Debug for Rec {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "rec<{},{}b,{}s>", self.addr, self.data.len(), self.ts)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
