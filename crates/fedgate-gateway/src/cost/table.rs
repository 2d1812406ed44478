//! Historical cost table: `fieldKey -> baseline` as of one point in time.
//!
//! The statistics backend is external. This module only reads its export:
//!
//! ```json
//! {
//!   "baselines": { "Query.products": 50.0 },
//!   "samples": [ { "field": "Query.me", "cost": 3.0, "observed_at": "2026-10-01T00:00:00Z" } ]
//! }
//! ```
//!
//! Samples inside the lookback window are reduced per field with a
//! nearest-rank percentile. Direct baselines win over sample-derived ones.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use fedgate_core::error::{FedgateError, Result};
use fedgate_core::FieldKey;

#[derive(Debug, Clone)]
pub struct HistoricalCostTable {
    baselines: HashMap<FieldKey, f64>,
    window: Duration,
    percentile: f64,
    as_of: Option<DateTime<Utc>>,
}

impl Default for HistoricalCostTable {
    fn default() -> Self {
        Self {
            baselines: HashMap::new(),
            window: Duration::from_secs(604_800),
            percentile: 1.0,
            as_of: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HistoricalStats {
    #[serde(default)]
    baselines: HashMap<String, f64>,
    #[serde(default)]
    samples: Vec<Sample>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Sample {
    field: String,
    cost: f64,
    observed_at: DateTime<Utc>,
}

fn check_cost(key: &str, cost: f64) -> Result<()> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(FedgateError::Config(format!(
            "historical cost for {key} must be a finite number >= 0 (got {cost})"
        )));
    }
    Ok(())
}

/// Nearest-rank percentile over an ascending slice.
fn nearest_rank(sorted: &[f64], percentile: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = ((percentile * n as f64).ceil() as usize).clamp(1, n);
    sorted.get(rank - 1).copied()
}

impl HistoricalCostTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_baselines(baselines: HashMap<FieldKey, f64>) -> Self {
        Self {
            baselines,
            as_of: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Build a table from a statistics export, evaluated at `now`.
    pub fn from_json_str(
        s: &str,
        window: Duration,
        percentile: f64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let stats: HistoricalStats = serde_json::from_str(s)
            .map_err(|e| FedgateError::Config(format!("invalid historical stats: {e}")))?;

        let span = chrono::Duration::from_std(window)
            .map_err(|e| FedgateError::Config(format!("cost lookback window out of range: {e}")))?;
        let cutoff = now - span;

        let mut per_field: HashMap<FieldKey, Vec<f64>> = HashMap::new();
        for sample in stats.samples {
            let key = FieldKey::parse(&sample.field)?;
            check_cost(key.as_str(), sample.cost)?;
            if sample.observed_at < cutoff || sample.observed_at > now {
                continue;
            }
            per_field.entry(key).or_default().push(sample.cost);
        }

        let mut baselines = HashMap::with_capacity(per_field.len() + stats.baselines.len());
        for (key, mut costs) in per_field {
            costs.sort_by(|a, b| a.total_cmp(b));
            if let Some(v) = nearest_rank(&costs, percentile) {
                baselines.insert(key, v);
            }
        }
        for (raw, cost) in stats.baselines {
            let key = FieldKey::parse(&raw)?;
            check_cost(key.as_str(), cost)?;
            baselines.insert(key, cost);
        }

        Ok(Self {
            baselines,
            window,
            percentile,
            as_of: Some(now),
        })
    }

    pub fn baseline(&self, key: &str) -> Option<f64> {
        self.baselines.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        self.as_of
    }
}
