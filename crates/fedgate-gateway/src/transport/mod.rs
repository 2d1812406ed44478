//! Transport layer (HTTP).
//!
//! Decodes the request body once into an `OperationRecord` and renders
//! decisions as GraphQL-shaped JSON responses.

pub mod codec;
pub mod http;
