//! The server-wide directory of known vessels.

use crate::target::Target;
use dashmap::DashMap;
use fairway_types::VesselId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Concurrent keyed store of targets, owned by the composition root and
/// injected wherever lookups are needed. No ambient singleton.
pub struct TargetRegistry {
    targets: DashMap<VesselId, Arc<Target>>,
    arrivals: AtomicU64,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self {
            targets: DashMap::new(),
            arrivals: AtomicU64::new(0),
        }
    }

    /// Look up a target, creating and registering it on first reference.
    /// Creation is effectively-once per id under concurrent callers; every
    /// caller gets the same record.
    pub fn get_or_create(&self, id: &VesselId) -> Arc<Target> {
        self.targets
            .entry(id.clone())
            .or_insert_with(|| {
                let order = self.arrivals.fetch_add(1, Ordering::Relaxed);
                Arc::new(Target::new(id.clone(), order))
            })
            .clone()
    }

    pub fn get(&self, id: &VesselId) -> Option<Arc<Target>> {
        self.targets.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot of all current targets, in no particular order.
    pub fn all(&self) -> Vec<Arc<Target>> {
        self.targets.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
