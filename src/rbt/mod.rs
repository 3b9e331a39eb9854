//! Module `rbt` implement a top-down left-leaning red-black tree.
//!
//! The tree is the workhorse behind [RbtIndex] and behind the
//! scheduler's interference-class dispatch. Refer to [Tree] for the
//! algorithmic details.
//!
//! [RbtIndex]: crate::index::RbtIndex

mod tree;

pub use tree::{Tree, TreeItem, NIL};
