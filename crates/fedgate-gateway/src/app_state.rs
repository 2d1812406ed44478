//! Shared application state for the fedgate gateway.
//!
//! Startup loads the snapshot files, opens the rejection sink and compiles the
//! admission pipeline once. Errors surface as `Result` so `main` can log and
//! exit instead of panicking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use fedgate_core::error::{FedgateError, Result};

use crate::config::{GatewayConfig, SinkConfig};
use crate::cost::{CostModel, HistoricalCostTable};
use crate::obs::AdmissionMetrics;
use crate::pipeline::AdmissionPipeline;
use crate::policy::Safelist;
use crate::report::{DrainHandle, JsonLinesSink, RejectionReporter, RejectionSink, TracingSink};
use crate::snapshot::SnapshotStore;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    pipeline: AdmissionPipeline,
    snapshots: Arc<SnapshotStore>,
    metrics: Arc<AdmissionMetrics>,
    drain: Mutex<Option<DrainHandle>>,
    started: Instant,
}

impl AppState {
    /// Build state with cost rules from config only. Needs a tokio runtime
    /// (the rejection drain task is spawned here).
    pub async fn new(cfg: GatewayConfig) -> Result<Self> {
        let model = CostModel::from_config(&cfg.cost_rules)?;
        Self::with_cost_model(cfg, model).await
    }

    /// Same as `new`, with a caller-built model (programmatic rules added).
    pub async fn with_cost_model(cfg: GatewayConfig, model: CostModel) -> Result<Self> {
        let metrics = Arc::new(AdmissionMetrics::default());

        let history = read_history(&cfg).await?;
        let safelist = read_safelist(&cfg).await?;
        record_snapshot_sizes(&metrics, &history, &safelist);
        tracing::info!(
            history_entries = history.len(),
            safelist_entries = safelist.len(),
            cost_rules = model.len(),
            "snapshots loaded"
        );
        let snapshots = Arc::new(SnapshotStore::new(history, safelist));

        let sink: Arc<dyn RejectionSink> = match &cfg.reporter.sink {
            SinkConfig::Tracing => Arc::new(TracingSink),
            SinkConfig::JsonLines { path } => Arc::new(JsonLinesSink::open(path).await?),
        };
        let (reporter, drain) =
            RejectionReporter::spawn(cfg.reporter.buffer, sink, Arc::clone(&metrics));

        let pipeline = AdmissionPipeline::from_config(
            &cfg,
            model,
            Arc::clone(&snapshots),
            reporter,
            Arc::clone(&metrics),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                pipeline,
                snapshots,
                metrics,
                drain: Mutex::new(Some(drain)),
                started: Instant::now(),
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn pipeline(&self) -> &AdmissionPipeline {
        &self.inner.pipeline
    }

    pub fn snapshots(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.inner.snapshots)
    }

    pub fn metrics(&self) -> Arc<AdmissionMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![("fedgate_uptime_seconds", self.inner.started.elapsed().as_secs())]
    }

    /// Stop queueing rejections and hand the buffered ones to the sink, waiting
    /// at most `timeout`. Later denials are counted as dropped. Only the first
    /// call does any work; it returns `true` when nothing was left behind.
    pub async fn flush_rejections(&self, timeout: Duration) -> bool {
        let Some(handle) = self.inner.drain.lock().take() else {
            return true;
        };
        let flushed = handle.flush(timeout).await;
        if flushed {
            tracing::info!("rejection queue flushed");
        } else {
            tracing::warn!(timeout = ?timeout, "rejection queue not flushed in time; records lost");
        }
        flushed
    }

    /// Re-read the history source and swap it in. The old table stays on error.
    pub async fn reload_history(&self) -> Result<()> {
        let table = read_history(self.cfg()).await?;
        self.inner
            .metrics
            .snapshot_entries
            .set(&[("snapshot", "history")], table.len() as i64);
        self.inner.snapshots.swap_history(table);
        Ok(())
    }

    pub async fn reload_safelist(&self) -> Result<()> {
        let list = read_safelist(self.cfg()).await?;
        self.inner
            .metrics
            .snapshot_entries
            .set(&[("snapshot", "safelist")], list.len() as i64);
        self.inner.snapshots.swap_safelist(list);
        Ok(())
    }

    /// Periodic reload tasks for every source with a `refresh_interval`.
    pub fn spawn_refreshers(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let cfg = self.cfg();

        if let (Some(_), Some(every)) = (&cfg.history.source, cfg.history.refresh_interval) {
            let app = self.clone();
            handles.push(tokio::spawn(async move {
                refresh_loop(every, "history", || app.reload_history()).await;
            }));
        }
        if let (Some(_), Some(every)) = (&cfg.safelist.manifest, cfg.safelist.refresh_interval) {
            let app = self.clone();
            handles.push(tokio::spawn(async move {
                refresh_loop(every, "safelist", || app.reload_safelist()).await;
            }));
        }
        handles
    }
}

async fn refresh_loop<F, Fut>(every: Duration, what: &'static str, mut reload: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // first tick completes immediately; startup already loaded
    tick.tick().await;
    loop {
        tick.tick().await;
        match reload().await {
            Ok(()) => tracing::debug!(snapshot = what, "snapshot refreshed"),
            Err(e) => tracing::warn!(snapshot = what, error = %e, "snapshot refresh failed; keeping previous"),
        }
    }
}

fn record_snapshot_sizes(metrics: &AdmissionMetrics, history: &HistoricalCostTable, safelist: &Safelist) {
    metrics
        .snapshot_entries
        .set(&[("snapshot", "history")], history.len() as i64);
    metrics
        .snapshot_entries
        .set(&[("snapshot", "safelist")], safelist.len() as i64);
}

async fn read_history(cfg: &GatewayConfig) -> Result<HistoricalCostTable> {
    let Some(path) = &cfg.history.source else {
        return Ok(HistoricalCostTable::empty());
    };
    let s = tokio::fs::read_to_string(path).await.map_err(|e| {
        FedgateError::Config(format!("read history {} failed: {e}", path.display()))
    })?;
    HistoricalCostTable::from_json_str(
        &s,
        cfg.admission.cost_lookback_window,
        cfg.admission.cost_percentile,
        Utc::now(),
    )
}

async fn read_safelist(cfg: &GatewayConfig) -> Result<Safelist> {
    let Some(path) = &cfg.safelist.manifest else {
        return Ok(Safelist::empty());
    };
    let s = tokio::fs::read_to_string(path).await.map_err(|e| {
        FedgateError::Config(format!("read safelist {} failed: {e}", path.display()))
    })?;
    Safelist::from_manifest_str(&s)
}
