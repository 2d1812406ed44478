//! Cost model: per-node cost contribution from rules and historical baselines.
//!
//! Rules are resolved once at configuration load into a `FieldKey -> CostRule`
//! map. Every rule is a pure function of the node and the historical table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use fedgate_core::error::Result;
use fedgate_core::{FieldKey, QueryNode};

use crate::config::CostRuleSpec;

use super::table::HistoricalCostTable;

/// Programmatic cost rule. Must be deterministic over its inputs.
pub trait CostFn: Send + Sync {
    fn cost(&self, node: &QueryNode, table: &HistoricalCostTable) -> f64;
}

impl<F> CostFn for F
where
    F: Fn(&QueryNode, &HistoricalCostTable) -> f64 + Send + Sync,
{
    fn cost(&self, node: &QueryNode, table: &HistoricalCostTable) -> f64 {
        self(node, table)
    }
}

#[derive(Clone)]
pub enum CostRule {
    /// Historical baseline as-is.
    Baseline,
    Fixed(f64),
    /// `baseline * factor`
    Scaled(f64),
    /// `baseline * (count / default_count)`; `count` read from `argument`.
    Paginated { argument: String, default_count: f64 },
    Custom(Arc<dyn CostFn>),
}

impl fmt::Debug for CostRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostRule::Baseline => f.write_str("Baseline"),
            CostRule::Fixed(c) => f.debug_tuple("Fixed").field(c).finish(),
            CostRule::Scaled(x) => f.debug_tuple("Scaled").field(x).finish(),
            CostRule::Paginated {
                argument,
                default_count,
            } => f
                .debug_struct("Paginated")
                .field("argument", argument)
                .field("default_count", default_count)
                .finish(),
            CostRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<&CostRuleSpec> for CostRule {
    fn from(spec: &CostRuleSpec) -> Self {
        match spec {
            CostRuleSpec::Baseline => CostRule::Baseline,
            CostRuleSpec::Fixed { cost } => CostRule::Fixed(*cost),
            CostRuleSpec::Scaled { factor } => CostRule::Scaled(*factor),
            CostRuleSpec::Paginated {
                argument,
                default_count,
            } => CostRule::Paginated {
                argument: argument.clone(),
                default_count: *default_count,
            },
        }
    }
}

/// Where a node's cost came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostSource {
    Rule,
    Baseline,
    /// No rule could be applied and no baseline exists (configuration gap).
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeCost {
    pub cost: f64,
    pub source: CostSource,
}

impl NodeCost {
    fn missing() -> Self {
        Self {
            cost: 0.0,
            source: CostSource::Missing,
        }
    }
}

/// Reads a count argument. `None` when absent; `Some(None)` when unusable.
fn count_argument(node: &QueryNode, name: &str) -> Option<Option<f64>> {
    let n = match node.argument(name)? {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Some(n.filter(|n| n.is_finite() && *n >= 0.0))
}

#[derive(Debug, Clone, Default)]
pub struct CostModel {
    rules: HashMap<FieldKey, CostRule>,
}

impl CostModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile configured rule specs. Keys are validated by config loading,
    /// parsed again here so a hand-built map cannot smuggle bad keys in.
    pub fn from_config<'a, I>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a CostRuleSpec)>,
    {
        let mut rules = HashMap::new();
        for (raw, spec) in specs {
            rules.insert(FieldKey::parse(raw)?, CostRule::from(spec));
        }
        Ok(Self { rules })
    }

    pub fn with_rule(mut self, key: FieldKey, rule: CostRule) -> Self {
        self.rules.insert(key, rule);
        self
    }

    pub fn rule(&self, key: &str) -> Option<&CostRule> {
        self.rules.get(key)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Cost of one node, children excluded. Never negative, never NaN, never infinite;
    /// overflow saturates at `f64::MAX`.
    pub fn node_cost(&self, node: &QueryNode, table: &HistoricalCostTable) -> NodeCost {
        let key = node.key.as_str();
        let baseline = table.baseline(key);

        let Some(rule) = self.rules.get(key) else {
            return match baseline {
                Some(cost) => NodeCost {
                    cost,
                    source: CostSource::Baseline,
                },
                None => NodeCost::missing(),
            };
        };

        let raw = match rule {
            CostRule::Fixed(cost) => *cost,
            CostRule::Custom(f) => f.cost(node, table),
            CostRule::Baseline | CostRule::Scaled(_) | CostRule::Paginated { .. } => {
                let Some(b) = baseline else {
                    return NodeCost::missing();
                };
                match rule {
                    CostRule::Scaled(factor) => b * factor,
                    CostRule::Paginated {
                        argument,
                        default_count,
                    } => match count_argument(node, argument) {
                        None => b,
                        Some(Some(n)) => b * (n / default_count),
                        Some(None) => {
                            tracing::debug!(
                                field_key = %key,
                                argument = %argument,
                                "count argument not numeric; using baseline"
                            );
                            b
                        }
                    },
                    _ => b,
                }
            }
        };

        if raw == f64::INFINITY {
            tracing::debug!(field_key = %key, "cost rule overflowed; saturating");
            return NodeCost {
                cost: f64::MAX,
                source: CostSource::Rule,
            };
        }
        if raw >= 0.0 {
            return NodeCost {
                cost: raw,
                source: CostSource::Rule,
            };
        }

        let fallback = baseline.unwrap_or(0.0);
        tracing::warn!(field_key = %key, cost = raw, fallback, "cost rule produced an invalid value");
        NodeCost {
            cost: fallback,
            source: if baseline.is_some() {
                CostSource::Baseline
            } else {
                CostSource::Missing
            },
        }
    }
}
