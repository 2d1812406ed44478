//! Cost check: sums per-node model costs over the tree and compares the
//! total to the configured budget.

use std::collections::HashSet;
use std::sync::Arc;

use fedgate_core::{FieldKey, QueryTree};

use crate::pipeline::AdmissionContext;
use crate::policy::{AdmissionCheck, CheckKind, DenyReason, Finding, Measurement};
use crate::snapshot::Snapshots;

use super::model::{CostModel, CostSource};
use super::table::HistoricalCostTable;

/// Totals for one query against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CostReport {
    pub total: f64,
    pub budget: f64,
    /// Distinct fields costed at 0 for lack of a rule and a baseline.
    pub config_gaps: Vec<FieldKey>,
}

impl CostReport {
    pub fn exceeded(&self) -> bool {
        self.total > self.budget
    }
}

/// Sums every node's model cost and compares it to `budget`.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    model: Arc<CostModel>,
    budget: f64,
}

impl CostEstimator {
    pub fn new(model: Arc<CostModel>, budget: f64) -> Self {
        Self { model, budget }
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn estimate(&self, tree: &QueryTree, table: &HistoricalCostTable) -> CostReport {
        let mut total: f64 = 0.0;
        let mut config_gaps: Vec<FieldKey> = Vec::new();
        let mut seen: HashSet<&FieldKey> = HashSet::new();

        for (node, _depth) in tree.walk() {
            let c = self.model.node_cost(node, table);
            total = (total + c.cost).min(f64::MAX);
            if c.source == CostSource::Missing && seen.insert(&node.key) {
                config_gaps.push(node.key.clone());
            }
        }

        for key in &config_gaps {
            tracing::warn!(field_key = %key, "no cost rule or historical baseline; costed at 0");
        }

        CostReport {
            total,
            budget: self.budget,
            config_gaps,
        }
    }
}

impl AdmissionCheck for CostEstimator {
    fn kind(&self) -> CheckKind {
        CheckKind::Cost
    }

    fn evaluate(&self, ctx: &AdmissionContext, snapshots: &Snapshots) -> Finding {
        let report = self.estimate(&ctx.tree, &snapshots.history);
        let exceeded = report.exceeded();
        let (total, budget) = (report.total, report.budget);
        let m = Measurement::Cost {
            cost: total,
            max_cost: budget,
            config_gaps: report.config_gaps,
        };

        if exceeded {
            return Finding::deny(
                CheckKind::Cost,
                DenyReason::CostExceeded,
                m,
                format!("query cost of {total} exceeds maximum allowed cost of {budget}"),
            );
        }
        Finding::pass(
            CheckKind::Cost,
            m,
            format!("query cost {total} within maximum {budget}"),
        )
    }
}
