//! Admission pipeline: per-request context, orchestration and downstream hand-off.

pub mod context;
pub mod forward;
pub mod orchestrator;

pub use context::AdmissionContext;
pub use forward::{AdmittedOperation, Downstream, ExecutionContext};
pub use orchestrator::{AdmissionOutcome, AdmissionPipeline, Dispatch};
