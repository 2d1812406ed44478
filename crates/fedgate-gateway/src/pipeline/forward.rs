//! Hand-off of admitted operations to the downstream execution engine.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use fedgate_core::error::Result;
use fedgate_core::{CallerIdentity, OperationRecord};

/// Typed context attached to an admitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub caller: CallerIdentity,
    pub operation_id: String,
}

impl ExecutionContext {
    /// Header pairs the downstream engine receives (caller identity).
    pub fn propagation_headers(&self, identity_header: &str) -> Vec<(String, String)> {
        vec![(identity_header.to_string(), self.caller.as_str().to_string())]
    }
}

#[derive(Debug, Clone)]
pub struct AdmittedOperation {
    pub record: OperationRecord,
    pub context: ExecutionContext,
}

/// Query planning and execution engine (external).
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn execute(&self, op: AdmittedOperation) -> Result<Value>;
}
