//! Admission decisions and per-check findings.
//!
//! A denial is an expected outcome, not an error. Every number quoted in a
//! `detail` string comes from the `Measurement` stored next to it.

use std::fmt;

use serde::{Deserialize, Serialize};

use fedgate_core::FieldKey;

pub use crate::config::schema::CheckKind;

/// Why a request was denied (stable wire codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    DepthExceeded,
    CostExceeded,
    NotSafelisted,
    AnonymousOperation,
    SubscriptionsDisabled,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::DepthExceeded => "DEPTH_EXCEEDED",
            DenyReason::CostExceeded => "COST_EXCEEDED",
            DenyReason::NotSafelisted => "NOT_SAFELISTED",
            DenyReason::AnonymousOperation => "ANONYMOUS_OPERATION",
            DenyReason::SubscriptionsDisabled => "SUBSCRIPTIONS_DISABLED",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values a check compared, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    Depth {
        depth: u32,
        max_depth: u32,
    },
    Cost {
        cost: f64,
        max_cost: f64,
        /// Fields that had neither a rule nor a historical baseline.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        config_gaps: Vec<FieldKey>,
    },
    Safelist {
        operation_id: String,
        registered: bool,
        bypass: bool,
        enforced: bool,
    },
    Operation {
        operation_type: &'static str,
        operation_name: Option<String>,
    },
}

/// Outcome of one check on one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub check: CheckKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied: Option<DenyReason>,
    pub measurement: Measurement,
    pub detail: String,
}

impl Finding {
    pub fn pass(check: CheckKind, measurement: Measurement, detail: impl Into<String>) -> Self {
        Self {
            check,
            denied: None,
            measurement,
            detail: detail.into(),
        }
    }

    pub fn deny(
        check: CheckKind,
        reason: DenyReason,
        measurement: Measurement,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            check,
            denied: Some(reason),
            measurement,
            detail: detail.into(),
        }
    }

    pub fn is_denied(&self) -> bool {
        self.denied.is_some()
    }
}

/// Terminal denial returned to the caller and sent to the rejection sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Denial {
    pub reason: DenyReason,
    pub detail: String,
    pub measurement: Measurement,
}

impl Denial {
    pub fn from_finding(f: &Finding) -> Option<Self> {
        f.denied.map(|reason| Self {
            reason,
            detail: f.detail.clone(),
            measurement: f.measurement.clone(),
        })
    }
}

/// Final admission decision for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Admit,
    Deny(Denial),
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Decision::Admit => None,
            Decision::Deny(d) => Some(d),
        }
    }

    /// Label used for metrics.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Decision::Admit => "none",
            Decision::Deny(d) => d.reason.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_copies_finding_values() {
        let f = Finding::deny(
            CheckKind::Depth,
            DenyReason::DepthExceeded,
            Measurement::Depth { depth: 11, max_depth: 10 },
            "query depth of 11 exceeds maximum allowed depth of 10",
        );
        let d = Denial::from_finding(&f).expect("denied finding");
        assert_eq!(d.reason, DenyReason::DepthExceeded);
        assert_eq!(d.measurement, f.measurement);

        let pass = Finding::pass(
            CheckKind::Depth,
            Measurement::Depth { depth: 2, max_depth: 10 },
            "ok",
        );
        assert!(Denial::from_finding(&pass).is_none());
    }

    #[test]
    fn decision_serializes_with_reason_code() {
        let d = Decision::Deny(Denial {
            reason: DenyReason::CostExceeded,
            detail: "x".into(),
            measurement: Measurement::Cost { cost: 100.0, max_cost: 90.0, config_gaps: vec![] },
        });
        let v = serde_json::to_value(&d).expect("serialize");
        assert_eq!(v["decision"], "deny");
        assert_eq!(v["reason"], "COST_EXCEEDED");
        assert_eq!(v["measurement"]["cost"], 100.0);
        assert!(v["measurement"].get("config_gaps").is_none());
        assert_eq!(d.reason_label(), "COST_EXCEEDED");
    }
}
