//! Query structure primitives.
//!
//! - `tree`: arena-backed Query Node tree with non-recursive walks
//! - `lower`: GraphQL text -> tree (malformed input stops here)
//! - `signature`: normalized text and the stable operation id

pub mod lower;
pub mod signature;
pub mod tree;

pub use lower::{lower_operation, LowerOptions, LoweredOperation};
pub use signature::{normalize, operation_id};
pub use tree::{FieldKey, NodeId, QueryNode, QueryTree, Walk};
