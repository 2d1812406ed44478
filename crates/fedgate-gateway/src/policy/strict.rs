//! Strict operations: only named queries and mutations are admitted.
//!
//! Anonymous operations cannot be attributed in cost history or rejection
//! reports, and the gateway never serves subscriptions. Both rules can be
//! relaxed from configuration; the check only runs when `check_order` lists
//! `strict_operations`.

use crate::config::StrictOperationsSection;
use crate::pipeline::AdmissionContext;
use crate::snapshot::Snapshots;

use super::decision::{CheckKind, DenyReason, Finding, Measurement};
use super::AdmissionCheck;

#[derive(Debug, Clone)]
pub struct StrictOperations {
    require_operation_name: bool,
    allow_subscriptions: bool,
}

impl StrictOperations {
    pub fn new(require_operation_name: bool, allow_subscriptions: bool) -> Self {
        Self {
            require_operation_name,
            allow_subscriptions,
        }
    }

    pub fn from_config(section: &StrictOperationsSection) -> Self {
        Self::new(section.require_operation_name, section.allow_subscriptions)
    }
}

impl AdmissionCheck for StrictOperations {
    fn kind(&self) -> CheckKind {
        CheckKind::StrictOperations
    }

    fn evaluate(&self, ctx: &AdmissionContext, _snapshots: &Snapshots) -> Finding {
        let m = Measurement::Operation {
            operation_type: ctx.operation_type,
            operation_name: ctx.operation_name.clone(),
        };

        if !self.allow_subscriptions && ctx.operation_type == "subscription" {
            return Finding::deny(
                CheckKind::StrictOperations,
                DenyReason::SubscriptionsDisabled,
                m,
                "subscriptions are not supported by this gateway",
            );
        }
        if self.require_operation_name && ctx.operation_name.is_none() {
            return Finding::deny(
                CheckKind::StrictOperations,
                DenyReason::AnonymousOperation,
                m,
                format!("anonymous {} operations are not allowed; name the operation", ctx.operation_type),
            );
        }
        Finding::pass(CheckKind::StrictOperations, m, "operation shape allowed")
    }
}
