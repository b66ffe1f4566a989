//! Ordered local mirror of a live query result.
//!
//! The mirror holds documents in the order the source last reported and is
//! only ever changed by applying a whole [`ChangeBatch`](crate::ChangeBatch):
//! a batch is validated against a dry run of the current identities first,
//! so a malformed batch leaves the mirror untouched.

mod list;
mod operations;

pub use list::OrderedMirror;
pub use operations::{validate_batch, ItemChange};
