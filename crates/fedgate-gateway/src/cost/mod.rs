//! Query cost: historical baselines, per-field rules and the budget check.
//!
//! - `table`: read-only `fieldKey -> baseline` snapshot
//! - `model`: cost of a single node (rules resolved at load time)
//! - `estimator`: sum over the whole tree, compared to the budget

pub mod estimator;
pub mod model;
pub mod table;

pub use estimator::{CostEstimator, CostReport};
pub use model::{CostFn, CostModel, CostRule, CostSource, NodeCost};
pub use table::HistoricalCostTable;
