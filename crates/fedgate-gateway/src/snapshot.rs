//! Hot-swappable read-only snapshots (historical costs, safelist).
//!
//! Readers clone the current `Arc` under a short read lock and keep it for the
//! whole request, so a refresh never changes data mid-evaluation.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cost::HistoricalCostTable;
use crate::policy::Safelist;

/// Snapshot pair a single request is evaluated against.
#[derive(Debug, Clone, Default)]
pub struct Snapshots {
    pub history: Arc<HistoricalCostTable>,
    pub safelist: Arc<Safelist>,
}

#[derive(Debug, Default)]
pub struct SnapshotStore {
    history: RwLock<Arc<HistoricalCostTable>>,
    safelist: RwLock<Arc<Safelist>>,
}

impl SnapshotStore {
    pub fn new(history: HistoricalCostTable, safelist: Safelist) -> Self {
        Self {
            history: RwLock::new(Arc::new(history)),
            safelist: RwLock::new(Arc::new(safelist)),
        }
    }

    pub fn load(&self) -> Snapshots {
        Snapshots {
            history: Arc::clone(&self.history.read()),
            safelist: Arc::clone(&self.safelist.read()),
        }
    }

    /// Replace the historical table; in-flight requests keep the old one.
    pub fn swap_history(&self, next: HistoricalCostTable) -> Arc<HistoricalCostTable> {
        std::mem::replace(&mut *self.history.write(), Arc::new(next))
    }

    pub fn swap_safelist(&self, next: Safelist) -> Arc<Safelist> {
        std::mem::replace(&mut *self.safelist.write(), Arc::new(next))
    }
}
