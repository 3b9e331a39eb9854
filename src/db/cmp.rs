//! Pluggable ordering, merging and predicate capabilities.
//!
//! Comparators receive raw record bytes and must implement a total
//! order. Decoding is done width-safe, never by subtracting values
//! into a narrower integer.

use std::cmp::Ordering;
use std::convert::TryInto;

use crate::db::Rec;

/// Total order over record bytes.
///
/// A comparator attached to an index that retains duplicates is allowed
/// to return [Ordering::Equal] for distinct handles, the index will then
/// disambiguate by handle address.
pub trait Comparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

impl<F> Comparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self(a, b)
    }
}

/// Resolve a duplicate-key collision when the index drops duplicates.
///
/// Return the handle the index shall keep.
pub trait Merger: Send + Sync {
    fn merge(&self, incoming: &Rec, existing: &Rec) -> Rec;
}

impl<F> Merger for F
where
    F: Fn(&Rec, &Rec) -> Rec + Send + Sync,
{
    fn merge(&self, incoming: &Rec, existing: &Rec) -> Rec {
        self(incoming, existing)
    }
}

/// Predicate over record bytes, used by queries, archive filtering and
/// sweep pruning.
pub trait Condition: Send + Sync {
    fn eval(&self, data: &[u8]) -> bool;
}

impl<F> Condition for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn eval(&self, data: &[u8]) -> bool {
        self(data)
    }
}

macro_rules! int_comparator {
    ($(#[$attr:meta])* $name:ident, $ty:ty, $n:expr) => {
        $(#[$attr])*
        pub struct $name;

        impl Comparator for $name {
            fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
                let x = <$ty>::from_ne_bytes(a[..$n].try_into().unwrap());
                let y = <$ty>::from_ne_bytes(b[..$n].try_into().unwrap());
                x.cmp(&y)
            }
        }
    };
}

int_comparator!(
    /// Order records as native-endian `u64` at offset zero.
    CmpU64, u64, 8
);
int_comparator!(
    /// Order records as native-endian `i64` at offset zero.
    CmpI64, i64, 8
);
int_comparator!(
    /// Order records as native-endian `u32` at offset zero.
    CmpU32, u32, 4
);
int_comparator!(
    /// Order records as native-endian `i32` at offset zero.
    CmpI32, i32, 4
);
int_comparator!(
    /// Order records as native-endian `u16` at offset zero.
    CmpU16, u16, 2
);
int_comparator!(
    /// Order records as native-endian `i16` at offset zero.
    CmpI16, i16, 2
);
int_comparator!(
    /// Order records as `u8` at offset zero.
    CmpU8, u8, 1
);
int_comparator!(
    /// Order records as `i8` at offset zero.
    CmpI8, i8, 1
);

macro_rules! float_comparator {
    ($(#[$attr:meta])* $name:ident, $ty:ty, $n:expr) => {
        $(#[$attr])*
        pub struct $name;

        impl Comparator for $name {
            fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
                let x = <$ty>::from_ne_bytes(a[..$n].try_into().unwrap());
                let y = <$ty>::from_ne_bytes(b[..$n].try_into().unwrap());
                x.total_cmp(&y)
            }
        }
    };
}

float_comparator!(
    /// Total order over records as native-endian `f32` at offset zero.
    CmpF32, f32, 4
);
float_comparator!(
    /// Total order over records as native-endian `f64` at offset zero.
    CmpF64, f64, 8
);

/// Lexicographic order over the full record bytes.
pub struct CmpBytes;

impl Comparator for CmpBytes {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Order records as NUL-terminated strings, comparing up to the first
/// NUL byte, or the full record when none is present.
pub struct CmpStr;

impl Comparator for CmpStr {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let x = a.split(|c| *c == 0).next().unwrap_or(a);
        let y = b.split(|c| *c == 0).next().unwrap_or(b);
        x.cmp(y)
    }
}

/// Key an index on bytes derived from the record rather than on the
/// record itself. The key function runs on both sides before the inner
/// comparator; keys of any length may be produced.
pub struct CmpBy<C>
where
    C: Comparator,
{
    keygen: Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
    inner: C,
}

impl<C> CmpBy<C>
where
    C: Comparator,
{
    pub fn new<K>(keygen: K, inner: C) -> CmpBy<C>
    where
        K: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        CmpBy {
            keygen: Box::new(keygen),
            inner,
        }
    }
}

impl<C> Comparator for CmpBy<C>
where
    C: Comparator,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let x = (self.keygen)(a);
        let y = (self.keygen)(b);
        self.inner.compare(&x, &y)
    }
}

/// Apply another comparator at a fixed byte offset into the record.
///
/// This is how an index is keyed on a field that does not sit at the
/// front of the record.
pub struct CmpAt<C>
where
    C: Comparator,
{
    offset: usize,
    inner: C,
}

impl<C> CmpAt<C>
where
    C: Comparator,
{
    pub fn new(offset: usize, inner: C) -> CmpAt<C> {
        CmpAt { offset, inner }
    }
}

impl<C> Comparator for CmpAt<C>
where
    C: Comparator,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.inner.compare(&a[self.offset..], &b[self.offset..])
    }
}

#[cfg(test)]
#[path = "cmp_test.rs"]
mod cmp_test;
