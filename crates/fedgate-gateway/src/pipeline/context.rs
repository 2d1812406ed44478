use fedgate_core::{OperationRecord, QueryTree};

use crate::policy::Finding;

use super::forward::ExecutionContext;

/// Per-request admission state. Built once after lowering, then read by every
/// check; only the orchestrator appends to `findings`.
#[derive(Debug, Clone)]
pub struct AdmissionContext {
    /// Original request, forwarded and reported unmodified.
    pub record: OperationRecord,
    pub operation_id: String,
    /// Name of the operation actually selected from the document.
    pub operation_name: Option<String>,
    pub operation_type: &'static str,
    pub tree: QueryTree,
    pub findings: Vec<Finding>,
}

impl AdmissionContext {
    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext {
            caller: self.record.caller.clone(),
            operation_id: self.operation_id.clone(),
        }
    }
}
