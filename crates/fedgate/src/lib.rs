//! Top-level facade crate for fedgate.
//!
//! Re-exports core types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use fedgate_core::*;
}

pub mod gateway {
    pub use fedgate_gateway::*;
}
