//! # Persistent Array
//!
//! An ordered sequence stored as a copy-on-write tree of fixed-fanout array
//! nodes. See [`ArrayTree`] for the node layout and the update paths, and
//! [`ArrayIter`] for lazy traversal.
//!
//! ## Operations
//!
//! | Operation  | Cost            | Nodes written        |
//! |------------|-----------------|----------------------|
//! | `len`      | O(1)            | 0                    |
//! | `get`      | O(log_B n)      | 0                    |
//! | `set`      | O(log_B n)      | height + 1, one leaf |
//! | `append`   | O(log_B n)      | height + 1, one leaf |
//! | `truncate` | O(log_B n)      | at most height + 1   |
//! | `iter`     | O(n) total      | 0                    |

mod iter;
mod tree;

pub use iter::{collect_values, ArrayIter};
pub use tree::ArrayTree;
