//! fedgate core: transport-agnostic admission primitives and error types.
//!
//! This crate defines the operation record, the parsed query tree, GraphQL
//! lowering and the operation signature shared by the gateway and tooling.
//! It carries no async runtime so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `FedgateError`/`Result` so production
//! processes do not crash on malformed queries or bad traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod operation;
pub mod query;

/// Shared result type.
pub use error::{Result, FedgateError};
pub use operation::{CallerIdentity, Environment, OperationRecord};
pub use query::{FieldKey, NodeId, QueryNode, QueryTree};
