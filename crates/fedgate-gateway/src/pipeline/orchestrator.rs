//! Admission orchestrator.
//!
//! `lower -> [check...] -> decision -> (report | forward)`.
//! Checks run in configured order; the first denial in that order is the
//! decision's reason. In dry-run mode every check runs and the decision is
//! always `Admit`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use fedgate_core::error::Result;
use fedgate_core::query::{lower_operation, operation_id, LowerOptions};
use fedgate_core::OperationRecord;

use crate::config::{CheckKind, EvaluationMode, GatewayConfig};
use crate::cost::{CostEstimator, CostModel};
use crate::obs::AdmissionMetrics;
use crate::policy::{
    AdmissionCheck, Decision, Denial, DepthLimiter, Measurement, SafelistChecker,
    StrictOperations,
};
use crate::report::RejectionReporter;
use crate::snapshot::SnapshotStore;

use super::context::AdmissionContext;
use super::forward::{AdmittedOperation, Downstream};

/// Decision plus the context it was reached with (findings included).
#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    pub decision: Decision,
    pub context: AdmissionContext,
}

/// Result of `admit_and_forward`.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Executed(Value),
    Denied(Denial),
}

pub struct AdmissionPipeline {
    checks: Vec<Box<dyn AdmissionCheck>>,
    snapshots: Arc<SnapshotStore>,
    reporter: RejectionReporter,
    metrics: Arc<AdmissionMetrics>,
    field_types: HashMap<String, String>,
    max_query_nodes: usize,
    dry_run: bool,
    evaluation: EvaluationMode,
}

impl AdmissionPipeline {
    /// Compile checks from config, in `admission.check_order`.
    /// `model` is taken separately so programmatic rules can be added first.
    pub fn from_config(
        cfg: &GatewayConfig,
        model: CostModel,
        snapshots: Arc<SnapshotStore>,
        reporter: RejectionReporter,
        metrics: Arc<AdmissionMetrics>,
    ) -> Self {
        let adm = &cfg.admission;
        let model = Arc::new(model);

        let checks = adm
            .check_order
            .iter()
            .map(|kind| -> Box<dyn AdmissionCheck> {
                match kind {
                    CheckKind::Depth => Box::new(DepthLimiter::new(adm.max_depth)),
                    CheckKind::Safelist => Box::new(SafelistChecker::new(adm.enforce_in_production)),
                    CheckKind::Cost => Box::new(CostEstimator::new(Arc::clone(&model), adm.max_cost)),
                    CheckKind::StrictOperations => {
                        Box::new(StrictOperations::from_config(&adm.strict_operations))
                    }
                }
            })
            .collect();

        Self {
            checks,
            snapshots,
            reporter,
            metrics,
            field_types: cfg.schema.field_types.clone(),
            max_query_nodes: cfg.gateway.max_query_nodes,
            dry_run: adm.debug_mode,
            evaluation: adm.evaluation,
        }
    }

    pub fn check_order(&self) -> Vec<CheckKind> {
        self.checks.iter().map(|c| c.kind()).collect()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Decide on one operation. `Err` only for malformed input; a denial is `Ok`.
    pub fn evaluate(&self, record: OperationRecord) -> Result<AdmissionOutcome> {
        let opts = LowerOptions {
            field_types: &self.field_types,
            max_nodes: self.max_query_nodes,
        };
        let lowered = match lower_operation(
            &record.query,
            record.operation_name.as_deref(),
            &record.variables,
            opts,
        ) {
            Ok(l) => l,
            Err(e) => {
                self.metrics.query_invalid.inc(&[]);
                tracing::debug!(caller = %record.caller, error = %e, "query invalid");
                return Err(e);
            }
        };

        let snapshots = self.snapshots.load();
        let mut ctx = AdmissionContext {
            operation_id: operation_id(&record.query),
            operation_name: lowered.operation_name,
            operation_type: lowered.operation_type,
            tree: lowered.tree,
            findings: Vec::with_capacity(self.checks.len()),
            record,
        };

        let run_all = self.dry_run || self.evaluation == EvaluationMode::CollectAll;
        let mut first_denial: Option<Denial> = None;

        for check in &self.checks {
            let started = Instant::now();
            let finding = check.evaluate(&ctx, &snapshots);
            self.metrics
                .check_duration
                .observe(&[("check", check.kind().as_str())], started.elapsed());

            if let Measurement::Cost { config_gaps, .. } = &finding.measurement {
                if !config_gaps.is_empty() {
                    self.metrics.cost_config_gaps.add(&[], config_gaps.len() as u64);
                }
            }
            if first_denial.is_none() {
                first_denial = Denial::from_finding(&finding);
            }
            let denied = finding.is_denied();
            ctx.findings.push(finding);
            if denied && !run_all {
                break;
            }
        }

        let decision = match first_denial {
            None => {
                self.metrics
                    .decisions
                    .inc(&[("outcome", "admit"), ("reason", "none")]);
                Decision::Admit
            }
            Some(denial) if self.dry_run => {
                tracing::info!(
                    caller = %ctx.record.caller,
                    operation_id = %ctx.operation_id,
                    reason = %denial.reason,
                    detail = %denial.detail,
                    "dry run: operation would be denied"
                );
                self.metrics
                    .decisions
                    .inc(&[("outcome", "dry_run_deny"), ("reason", denial.reason.as_str())]);
                Decision::Admit
            }
            Some(denial) => {
                self.reporter.report(&ctx, &denial);
                self.metrics
                    .decisions
                    .inc(&[("outcome", "deny"), ("reason", denial.reason.as_str())]);
                Decision::Deny(denial)
            }
        };

        tracing::debug!(
            caller = %ctx.record.caller,
            operation_id = %ctx.operation_id,
            decision = decision.reason_label(),
            "admission decided"
        );
        Ok(AdmissionOutcome {
            decision,
            context: ctx,
        })
    }

    /// Admit, then hand the unmodified record to `downstream`. Denied
    /// operations never reach it.
    pub async fn admit_and_forward(
        &self,
        record: OperationRecord,
        downstream: &dyn Downstream,
    ) -> Result<Dispatch> {
        let outcome = self.evaluate(record)?;
        match outcome.decision {
            Decision::Deny(denial) => Ok(Dispatch::Denied(denial)),
            Decision::Admit => {
                let context = outcome.context.execution_context();
                let op = AdmittedOperation {
                    record: outcome.context.record,
                    context,
                };
                downstream.execute(op).await.map(Dispatch::Executed)
            }
        }
    }
}
