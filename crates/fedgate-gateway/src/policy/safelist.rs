//! Operation safelist: registry snapshot and the admission check over it.
//!
//! The snapshot is owned by an external registry; this module only loads
//! manifests it publishes and answers membership queries.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use fedgate_core::error::{FedgateError, Result};
use fedgate_core::query::operation_id;

use crate::pipeline::AdmissionContext;
use crate::snapshot::Snapshots;

use super::decision::{CheckKind, DenyReason, Finding, Measurement};
use super::AdmissionCheck;

/// Read-only set of registered operation ids.
#[derive(Debug, Clone, Default)]
pub struct Safelist {
    ids: HashSet<String>,
    loaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    version: u32,
    #[serde(default)]
    operations: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

impl Safelist {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ids: ids.into_iter().map(|s| s.as_ref().to_ascii_lowercase()).collect(),
            loaded_at: Some(Utc::now()),
        }
    }

    /// Register operations by their text (identity computed the same way as for requests).
    pub fn from_operations<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_ids(bodies.into_iter().map(|b| operation_id(b.as_ref())))
    }

    /// Parse an operation manifest (`{ version: 1, operations: [{ id?, name?, body? }] }`).
    /// Entries with a body are keyed by the hash of that body.
    pub fn from_manifest_str(s: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(s)
            .map_err(|e| FedgateError::Config(format!("invalid safelist manifest: {e}")))?;
        if manifest.version != 1 {
            return Err(FedgateError::UnsupportedVersion);
        }

        let mut ids = HashSet::with_capacity(manifest.operations.len());
        for (i, entry) in manifest.operations.into_iter().enumerate() {
            let id = match (entry.body, entry.id) {
                (Some(body), _) => operation_id(&body),
                (None, Some(id)) if !id.trim().is_empty() => id.trim().to_ascii_lowercase(),
                _ => {
                    return Err(FedgateError::Config(format!(
                        "safelist manifest entry {i} ({}) has neither id nor body",
                        entry.name.as_deref().unwrap_or("unnamed")
                    )));
                }
            };
            ids.insert(id);
        }

        Ok(Self {
            ids,
            loaded_at: Some(Utc::now()),
        })
    }

    pub fn contains(&self, operation_id: &str) -> bool {
        self.ids.contains(operation_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }
}

/// Denies unregistered operations unless bypassed or enforcement is off.
#[derive(Debug, Clone)]
pub struct SafelistChecker {
    enforce_in_production: bool,
}

impl SafelistChecker {
    pub fn new(enforce_in_production: bool) -> Self {
        Self {
            enforce_in_production,
        }
    }
}

impl AdmissionCheck for SafelistChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::Safelist
    }

    fn evaluate(&self, ctx: &AdmissionContext, snapshots: &Snapshots) -> Finding {
        let registered = snapshots.safelist.contains(&ctx.operation_id);
        let bypass = ctx.record.bypass;
        let enforced = self.enforce_in_production && ctx.record.environment.is_production();

        let m = Measurement::Safelist {
            operation_id: ctx.operation_id.clone(),
            registered,
            bypass,
            enforced,
        };

        if registered {
            return Finding::pass(CheckKind::Safelist, m, "operation is registered");
        }
        if bypass {
            return Finding::pass(CheckKind::Safelist, m, "unregistered operation allowed by override");
        }
        if !enforced {
            return Finding::pass(
                CheckKind::Safelist,
                m,
                format!(
                    "unregistered operation allowed: enforcement off in {}",
                    ctx.record.environment.as_str()
                ),
            );
        }

        let detail = format!("operation {} is not in the safelist", ctx.operation_id);
        Finding::deny(CheckKind::Safelist, DenyReason::NotSafelisted, m, detail)
    }
}
