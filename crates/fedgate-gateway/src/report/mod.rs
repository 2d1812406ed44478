//! Rejection reporting.
//!
//! The request path only does a non-blocking `try_send` into a bounded queue.
//! A background task drains the queue into a `RejectionSink`; a slow or
//! failing sink drops records (counted) but never delays a decision.

pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use fedgate_core::CallerIdentity;

use crate::obs::AdmissionMetrics;
use crate::pipeline::AdmissionContext;
use crate::policy::{Denial, DenyReason, Finding, Measurement};

pub use sink::{JsonLinesSink, RejectionSink, TracingSink};

/// One denied operation, as handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionRecord {
    pub timestamp: DateTime<Utc>,
    pub caller: CallerIdentity,
    pub operation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Original request text.
    pub query: String,
    pub reason: DenyReason,
    pub detail: String,
    pub measurement: Measurement,
    pub findings: Vec<Finding>,
}

impl RejectionRecord {
    pub fn new(ctx: &AdmissionContext, denial: &Denial) -> Self {
        Self {
            timestamp: Utc::now(),
            caller: ctx.record.caller.clone(),
            operation_id: ctx.operation_id.clone(),
            operation_name: ctx.operation_name.clone(),
            query: ctx.record.query.clone(),
            reason: denial.reason,
            detail: denial.detail.clone(),
            measurement: denial.measurement.clone(),
            findings: ctx.findings.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RejectionReporter {
    tx: mpsc::Sender<RejectionRecord>,
    metrics: Arc<AdmissionMetrics>,
}

impl RejectionReporter {
    /// Reporter plus the receiving end; the caller owns draining.
    pub fn channel(
        buffer: usize,
        metrics: Arc<AdmissionMetrics>,
    ) -> (Self, mpsc::Receiver<RejectionRecord>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx, metrics }, rx)
    }

    /// Reporter with a background task draining into `sink`. Needs a tokio runtime.
    pub fn spawn(
        buffer: usize,
        sink: Arc<dyn RejectionSink>,
        metrics: Arc<AdmissionMetrics>,
    ) -> (Self, DrainHandle) {
        let (reporter, rx) = Self::channel(buffer, metrics);
        let (stop, stopped) = oneshot::channel();
        let join = tokio::spawn(drain(rx, sink, stopped));
        (reporter, DrainHandle { stop, join })
    }

    /// Fire-and-forget. Never blocks, never fails the caller.
    pub fn report(&self, ctx: &AdmissionContext, denial: &Denial) {
        let record = RejectionRecord::new(ctx, denial);
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(r)) => {
                self.metrics.reporter_dropped.inc(&[("cause", "full")]);
                tracing::warn!(operation_id = %r.operation_id, reason = %r.reason, "rejection queue full; record dropped");
            }
            Err(TrySendError::Closed(r)) => {
                self.metrics.reporter_dropped.inc(&[("cause", "closed")]);
                tracing::warn!(operation_id = %r.operation_id, reason = %r.reason, "rejection queue closed; record dropped");
            }
        }
    }
}

/// Owner of the background drain task.
///
/// Dropping the handle leaves the task running until every sender is gone.
#[derive(Debug)]
pub struct DrainHandle {
    stop: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl DrainHandle {
    /// Close the queue, hand every buffered record to the sink and wait for the
    /// task to finish. Returns `false` if `timeout` elapsed first; records still
    /// queued at that point are lost.
    pub async fn flush(self, timeout: Duration) -> bool {
        // the task may already be gone; then there is nothing to flush
        let _ = self.stop.send(());
        match tokio::time::timeout(timeout, self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "rejection drain task failed");
                false
            }
            Err(_) => false,
        }
    }
}

enum Step {
    Record(Option<RejectionRecord>),
    Stop { requested: bool },
}

/// Drain the queue into the sink until every sender is gone or `stop` fires.
/// After `stop`, the queue refuses new records and the buffered ones are still
/// emitted. Sink errors are logged and the loop moves on to the next record.
pub async fn drain(
    mut rx: mpsc::Receiver<RejectionRecord>,
    sink: Arc<dyn RejectionSink>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut listening = true;
    loop {
        let step = tokio::select! {
            record = rx.recv() => Step::Record(record),
            res = &mut stop, if listening => Step::Stop { requested: res.is_ok() },
        };

        match step {
            Step::Stop { requested } => {
                listening = false;
                if requested {
                    rx.close();
                }
            }
            Step::Record(None) => break,
            Step::Record(Some(record)) => {
                if let Err(e) = sink.emit(&record).await {
                    tracing::warn!(
                        sink = sink.name(),
                        operation_id = %record.operation_id,
                        error = %e,
                        "rejection sink failed; record dropped"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::pipeline::test_support::chain_context;
    use crate::policy::CheckKind;

    fn denial() -> Denial {
        Denial {
            reason: DenyReason::DepthExceeded,
            detail: "query depth of 3 exceeds maximum allowed depth of 2".into(),
            measurement: Measurement::Depth { depth: 3, max_depth: 2 },
        }
    }

    #[tokio::test]
    async fn report_carries_caller_and_query() {
        let metrics = Arc::new(AdmissionMetrics::default());
        let (reporter, mut rx) = RejectionReporter::channel(4, Arc::clone(&metrics));
        let ctx = chain_context(3);

        reporter.report(&ctx, &denial());
        let r = rx.recv().await.expect("record");
        assert_eq!(r.caller, ctx.record.caller);
        assert_eq!(r.query, ctx.record.query);
        assert_eq!(r.operation_id, ctx.operation_id);
        assert_eq!(r.reason, DenyReason::DepthExceeded);
    }

    #[tokio::test]
    async fn overflow_and_closed_are_counted_not_raised() {
        let metrics = Arc::new(AdmissionMetrics::default());
        let (reporter, rx) = RejectionReporter::channel(1, Arc::clone(&metrics));
        let ctx = chain_context(3);

        reporter.report(&ctx, &denial());
        reporter.report(&ctx, &denial());
        assert_eq!(metrics.reporter_dropped.get(&[("cause", "full")]), 1);

        drop(rx);
        reporter.report(&ctx, &denial());
        assert_eq!(metrics.reporter_dropped.get(&[("cause", "closed")]), 1);
    }

    /// Fails every `fail_first` records, then keeps the rest.
    #[derive(Default)]
    struct FlakySink {
        fail_first: usize,
        attempts: AtomicUsize,
        kept: parking_lot::Mutex<Vec<RejectionRecord>>,
    }

    #[async_trait::async_trait]
    impl RejectionSink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn emit(&self, record: &RejectionRecord) -> fedgate_core::error::Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(fedgate_core::FedgateError::Internal("sink unavailable".into()));
            }
            self.kept.lock().push(record.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn sink_errors_do_not_stop_the_drain() {
        let sink = Arc::new(FlakySink {
            fail_first: 2,
            ..FlakySink::default()
        });
        let metrics = Arc::new(AdmissionMetrics::default());
        let (reporter, handle) = RejectionReporter::spawn(8, sink.clone(), Arc::clone(&metrics));

        for depth in 3..8 {
            reporter.report(&chain_context(depth), &denial());
        }
        drop(reporter);
        assert!(handle.flush(Duration::from_secs(5)).await);

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 5);
        let kept = sink.kept.lock();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].query, chain_context(5).record.query);
        assert_eq!(metrics.reporter_dropped.get(&[("cause", "full")]), 0);
    }

    #[tokio::test]
    async fn flush_emits_buffered_records_while_senders_live() {
        let sink = Arc::new(FlakySink::default());
        let metrics = Arc::new(AdmissionMetrics::default());
        let (reporter, handle) = RejectionReporter::spawn(8, sink.clone(), Arc::clone(&metrics));
        let ctx = chain_context(3);

        for _ in 0..3 {
            reporter.report(&ctx, &denial());
        }
        assert!(handle.flush(Duration::from_secs(5)).await);
        assert_eq!(sink.kept.lock().len(), 3);

        reporter.report(&ctx, &denial());
        assert_eq!(metrics.reporter_dropped.get(&[("cause", "closed")]), 1);
    }

    #[tokio::test]
    async fn dropped_handle_keeps_draining() {
        let sink = Arc::new(FlakySink::default());
        let (reporter, handle) =
            RejectionReporter::spawn(8, sink.clone(), Arc::new(AdmissionMetrics::default()));
        drop(handle);

        reporter.report(&chain_context(3), &denial());
        for _ in 0..100 {
            if !sink.kept.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.kept.lock().len(), 1);
    }

    #[test]
    fn record_serializes_camel_case() {
        let mut ctx = chain_context(3);
        ctx.findings.push(Finding::deny(
            CheckKind::Depth,
            DenyReason::DepthExceeded,
            Measurement::Depth { depth: 3, max_depth: 2 },
            "x",
        ));
        let v = serde_json::to_value(RejectionRecord::new(&ctx, &denial())).expect("json");
        assert_eq!(v["reason"], "DEPTH_EXCEEDED");
        assert_eq!(v["caller"], "user-1");
        assert!(v["operationId"].is_string());
        assert_eq!(v["findings"][0]["check"], "depth");
        assert_eq!(v["measurement"]["kind"], "depth");
    }
}
