use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use fedgate_core::error::{FedgateError, Result};
use fedgate_core::{Environment, FieldKey};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub admission: AdmissionSection,

    /// `Type.field -> rule`, compiled once into the cost model.
    #[serde(default)]
    pub cost_rules: BTreeMap<String, CostRuleSpec>,

    #[serde(default)]
    pub schema: SchemaSection,

    #[serde(default)]
    pub safelist: SafelistSection,

    #[serde(default)]
    pub history: HistorySection,

    #[serde(default)]
    pub reporter: ReporterSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(FedgateError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.admission.validate()?;
        self.schema.validate()?;
        self.reporter.validate()?;

        for (key, rule) in &self.cost_rules {
            FieldKey::parse(key)?;
            rule.validate(key)?;
        }

        for (name, interval) in [
            ("safelist.refresh_interval", self.safelist.refresh_interval),
            ("history.refresh_interval", self.history.refresh_interval),
        ] {
            if interval.is_some_and(|d| d < Duration::from_secs(1)) {
                return Err(FedgateError::Config(format!("{name} must be at least 1s")));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Header carrying the caller identity in, and propagated downstream.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Presence of this header is the trusted safelist override signal.
    #[serde(default = "default_bypass_header")]
    pub bypass_header: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_max_query_nodes")]
    pub max_query_nodes: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            identity_header: default_identity_header(),
            bypass_header: default_bypass_header(),
            max_body_bytes: default_max_body_bytes(),
            max_query_nodes: default_max_query_nodes(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|e| {
            FedgateError::Config(format!("gateway.listen must be a socket address: {e}"))
        })?;
        for (name, value) in [
            ("gateway.identity_header", &self.identity_header),
            ("gateway.bypass_header", &self.bypass_header),
        ] {
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
                return Err(FedgateError::Config(format!("{name} must be a valid header name")));
            }
        }
        if self.max_body_bytes < 1024 {
            return Err(FedgateError::Config(
                "gateway.max_body_bytes must be at least 1024".into(),
            ));
        }
        if self.max_query_nodes == 0 {
            return Err(FedgateError::Config(
                "gateway.max_query_nodes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:4000".into()
}
fn default_identity_header() -> String {
    "userid".into()
}
fn default_bypass_header() -> String {
    "override".into()
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_max_query_nodes() -> usize {
    10_000
}

/// One admission check, named for ordering in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Depth,
    Safelist,
    Cost,
    StrictOperations,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Depth => "depth",
            CheckKind::Safelist => "safelist",
            CheckKind::Cost => "cost",
            CheckKind::StrictOperations => "strict_operations",
        }
    }
}

/// Whether the pipeline stops at the first denial or runs every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    #[default]
    ShortCircuit,
    CollectAll,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionSection {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_max_cost")]
    pub max_cost: f64,

    #[serde(default = "default_lookback", deserialize_with = "de_duration")]
    pub cost_lookback_window: Duration,

    #[serde(default = "default_percentile")]
    pub cost_percentile: f64,

    /// Dry-run: compute and log everything, never deny.
    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default = "default_true")]
    pub enforce_in_production: bool,

    #[serde(default)]
    pub environment: Environment,

    #[serde(default = "default_check_order")]
    pub check_order: Vec<CheckKind>,

    #[serde(default)]
    pub evaluation: EvaluationMode,

    /// Settings for the `strict_operations` check; unused unless it is in `check_order`.
    #[serde(default)]
    pub strict_operations: StrictOperationsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrictOperationsSection {
    #[serde(default = "default_true")]
    pub require_operation_name: bool,

    #[serde(default)]
    pub allow_subscriptions: bool,
}

impl Default for StrictOperationsSection {
    fn default() -> Self {
        Self {
            require_operation_name: true,
            allow_subscriptions: false,
        }
    }
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_cost: default_max_cost(),
            cost_lookback_window: default_lookback(),
            cost_percentile: default_percentile(),
            debug_mode: false,
            enforce_in_production: true,
            environment: Environment::default(),
            check_order: default_check_order(),
            evaluation: EvaluationMode::default(),
            strict_operations: StrictOperationsSection::default(),
        }
    }
}

impl AdmissionSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(FedgateError::Config("admission.max_depth must be at least 1".into()));
        }
        if !self.max_cost.is_finite() || self.max_cost < 0.0 {
            return Err(FedgateError::Config(
                "admission.max_cost must be a finite number >= 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cost_percentile) {
            return Err(FedgateError::Config(
                "admission.cost_percentile must be between 0 and 1".into(),
            ));
        }
        if self.cost_lookback_window.is_zero() {
            return Err(FedgateError::Config(
                "admission.cost_lookback_window must be greater than 0".into(),
            ));
        }
        if self.check_order.is_empty() {
            return Err(FedgateError::Config("admission.check_order must not be empty".into()));
        }
        for (i, kind) in self.check_order.iter().enumerate() {
            if self.check_order[..i].contains(kind) {
                return Err(FedgateError::Config(format!(
                    "admission.check_order lists {} twice",
                    kind.as_str()
                )));
            }
        }
        Ok(())
    }
}

fn default_max_depth() -> u32 {
    10
}
fn default_max_cost() -> f64 {
    1500.0
}
fn default_lookback() -> Duration {
    Duration::from_secs(604_800)
}
fn default_percentile() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_check_order() -> Vec<CheckKind> {
    vec![CheckKind::Depth, CheckKind::Safelist, CheckKind::Cost]
}

/// Declarative cost rule; compiled into `cost::CostRule` at load time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum CostRuleSpec {
    /// Historical baseline (same as having no rule, but documents intent).
    Baseline,
    Fixed { cost: f64 },
    /// `baseline * factor`
    Scaled { factor: f64 },
    /// `baseline * (argument / default_count)`
    Paginated { argument: String, default_count: f64 },
}

impl CostRuleSpec {
    fn validate(&self, key: &str) -> Result<()> {
        let bad = |what: &str| -> Result<()> {
            Err(FedgateError::Config(format!("cost_rules.{key}: {what}")))
        };
        match self {
            CostRuleSpec::Baseline => Ok(()),
            CostRuleSpec::Fixed { cost } if !cost.is_finite() || *cost < 0.0 => {
                bad("cost must be a finite number >= 0")
            }
            CostRuleSpec::Scaled { factor } if !factor.is_finite() || *factor < 0.0 => {
                bad("factor must be a finite number >= 0")
            }
            CostRuleSpec::Paginated { argument, .. } if argument.is_empty() => {
                bad("argument must not be empty")
            }
            CostRuleSpec::Paginated { default_count, .. }
                if !default_count.is_finite() || *default_count <= 0.0 =>
            {
                bad("default_count must be greater than 0")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSection {
    /// `Type.field -> ReturnType` for naming nested field keys.
    #[serde(default)]
    pub field_types: HashMap<String, String>,
}

impl SchemaSection {
    pub fn validate(&self) -> Result<()> {
        for (key, ty) in &self.field_types {
            FieldKey::parse(key)?;
            if ty.is_empty() {
                return Err(FedgateError::Config(format!("schema.field_types.{key} is empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafelistSection {
    /// Operation manifest (JSON). Absent => empty safelist.
    #[serde(default)]
    pub manifest: Option<PathBuf>,

    #[serde(default, deserialize_with = "de_opt_duration")]
    pub refresh_interval: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistorySection {
    /// Historical statistics export (JSON). Absent => empty table.
    #[serde(default)]
    pub source: Option<PathBuf>,

    #[serde(default, deserialize_with = "de_opt_duration")]
    pub refresh_interval: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum SinkConfig {
    #[default]
    Tracing,
    JsonLines { path: PathBuf },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReporterSection {
    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default = "default_reporter_buffer")]
    pub buffer: usize,

    /// How long shutdown waits for queued records to reach the sink.
    #[serde(default = "default_flush_timeout", deserialize_with = "de_duration")]
    pub flush_timeout: Duration,
}

impl Default for ReporterSection {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            buffer: default_reporter_buffer(),
            flush_timeout: default_flush_timeout(),
        }
    }
}

impl ReporterSection {
    pub fn validate(&self) -> Result<()> {
        if self.buffer == 0 {
            return Err(FedgateError::Config("reporter.buffer must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_reporter_buffer() -> usize {
    1024
}
fn default_flush_timeout() -> Duration {
    Duration::from_secs(5)
}

fn de_duration<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
    let s = String::deserialize(d)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

fn de_opt_duration<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<Duration>, D::Error> {
    match Option::<String>::deserialize(d)? {
        Some(s) => humantime::parse_duration(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
