//! Rejection sinks. Errors are returned to the drain loop, which logs them.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use fedgate_core::error::{FedgateError, Result};

use super::RejectionRecord;

#[async_trait]
pub trait RejectionSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn emit(&self, record: &RejectionRecord) -> Result<()>;
}

/// Structured `warn` event per rejection on target `fedgate::rejections`.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl RejectionSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn emit(&self, record: &RejectionRecord) -> Result<()> {
        let measurement = serde_json::to_string(&record.measurement)
            .map_err(|e| FedgateError::Internal(format!("encode measurement: {e}")))?;
        tracing::warn!(
            target: "fedgate::rejections",
            caller = %record.caller,
            operation_id = %record.operation_id,
            operation_name = record.operation_name.as_deref().unwrap_or(""),
            reason = %record.reason,
            detail = %record.detail,
            measurement = %measurement,
            "operation rejected"
        );
        Ok(())
    }
}

/// Appends one JSON document per line.
#[derive(Debug)]
pub struct JsonLinesSink {
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| {
                FedgateError::Config(format!("open rejection log {} failed: {e}", path.display()))
            })?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl RejectionSink for JsonLinesSink {
    fn name(&self) -> &'static str {
        "json_lines"
    }

    async fn emit(&self, record: &RejectionRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| FedgateError::Internal(format!("encode rejection: {e}")))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| FedgateError::Internal(format!("write rejection: {e}")))?;
        file.flush()
            .await
            .map_err(|e| FedgateError::Internal(format!("flush rejection: {e}")))
    }
}
