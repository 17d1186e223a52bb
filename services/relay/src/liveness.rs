//! Eviction of connections that never resumed.
//!
//! A transport drop leaves the logical connection attached to its target so
//! the vessel can resume. A vessel that stays away past the retention
//! window gets its connection destroyed; the target record itself persists,
//! keeping position and service registrations visible to lookups.

use crate::metrics::RelayMetrics;
use fairway_registry::TargetRegistry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub fn spawn_eviction_sweep(
    registry: Arc<TargetRegistry>,
    metrics: Arc<RelayMetrics>,
    retention: Duration,
    sweep_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            retention_secs = retention.as_secs(),
            "eviction sweep started"
        );
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_once(&registry, &metrics, retention);
        }
    })
}

pub fn sweep_once(registry: &TargetRegistry, metrics: &RelayMetrics, retention: Duration) {
    for target in registry.all() {
        let expired = target
            .detached_since()
            .is_some_and(|since| since.elapsed() >= retention);
        if !expired {
            continue;
        }
        if let Some(session) = target.drop_connection() {
            session.close();
            metrics.evictions.fetch_add(1, Ordering::Relaxed);
            info!(vessel = %target.id(), "evicted connection that never resumed");
        }
    }
}
