//! Odb is an embeddable object-database: a process local, in-memory
//! datastore that holds fixed or variable length records, maintains one
//! or more secondary indexes over them and supports concurrent readers
//! and writers, bulk pruning, time based expiry and optional disk
//! archiving.
//!
//! The heart of the crate is the indexed-datastore kernel,
//!
//! * [DataStore] own the record bytes and hand out stable [Rec] handles.
//! * [Index] implementations, [RbtIndex] and [ListIndex], order those
//!   handles and answer point, range and predicate queries through
//!   iterators.
//! * [rbt::Tree], a top-down left-leaning red-black tree, one descent
//!   per insert and per delete, with embedded duplicate subtrees keyed
//!   on handle address.
//!
//! A small work [Scheduler] that understands interference classes is
//! included because it is the concurrency substrate used for parallel
//! sweeps and deferred work.
//!
//! Indexes shall be created against a live datastore, populated from its
//! current contents and kept consistent on every subsequent add. Records
//! are swept out either by age or by a caller supplied [Condition], and
//! every attached index is notified before storage is reclaimed.

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(StoreFull, msg: "limit {}", limit)
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fd.read(&mut buf))
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fd.read(&mut buf), "reading {:?}", file)
/// ```
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

pub mod archive;
pub mod db;
pub mod index;
pub mod rbt;
pub mod scheduler;
pub mod store;
pub mod util;

pub use crate::archive::AppendOnlyFile;
pub use crate::db::{Addr, Comparator, Condition, Merger, Rec};
pub use crate::index::{Index, IndexGroup, Iter, ListIndex, RbtIndex};
pub use crate::scheduler::Scheduler;
pub use crate::store::{Config, DataStore, Markset, Mode};

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location.
pub enum Error {
    Fatal(String, String),
    FailConvert(String, String),
    IOError(String, String),
    InvalidFile(String, String),
    InvalidInput(String, String),
    IPCFail(String, String),
    ThreadFail(String, String),
    StoreFull(String, String),
    Closed(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            FailConvert(p, msg) => write!(f, "{} FailConvert: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            InvalidFile(p, msg) => write!(f, "{} InvalidFile: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            IPCFail(p, msg) => write!(f, "{} IPCFail: {}", p, msg),
            ThreadFail(p, msg) => write!(f, "{} ThreadFail: {}", p, msg),
            StoreFull(p, msg) => write!(f, "{} StoreFull: {}", p, msg),
            Closed(p, msg) => write!(f, "{} Closed: {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}
