//! Policy layer (decisions, depth limit, safelist, strict operations).
//!
//! Checks are compiled from configuration once at startup and shared by every
//! request. Each check is pure: it reads the request context and the current
//! snapshots and returns a `Finding`.

pub mod decision;
pub mod depth;
pub mod safelist;
pub mod strict;

pub use decision::{CheckKind, Decision, Denial, DenyReason, Finding, Measurement};
pub use depth::DepthLimiter;
pub use safelist::{Safelist, SafelistChecker};
pub use strict::StrictOperations;

use crate::pipeline::AdmissionContext;
use crate::snapshot::Snapshots;

/// One link in the admission chain.
pub trait AdmissionCheck: Send + Sync {
    fn kind(&self) -> CheckKind;
    fn evaluate(&self, ctx: &AdmissionContext, snapshots: &Snapshots) -> Finding;
}
