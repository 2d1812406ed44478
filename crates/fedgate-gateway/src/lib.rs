//! fedgate gateway library entry.
//!
//! Wires configuration, the cost model, the admission checks, rejection
//! reporting and the HTTP surface into one admission gateway. Consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod cost;
pub mod obs;
pub mod ops;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod router;
pub mod snapshot;
pub mod transport;
