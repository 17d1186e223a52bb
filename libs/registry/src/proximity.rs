//! The proximity index: spatial queries over a periodically rebuilt
//! snapshot of vessel positions.
//!
//! Position updates land on targets immediately but queries run against the
//! latest snapshot, so results are eventually consistent with a staleness
//! bound equal to the rebuild interval. Rebuilding on a fixed schedule
//! instead of on every report keeps high-rate position traffic off the
//! query path.

use crate::registry::TargetRegistry;
use crate::target::Target;
use fairway_types::Position;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// One query result: a target and its geodesic distance from the origin.
pub struct NearTarget {
    pub target: Arc<Target>,
    pub distance_m: f64,
}

struct IndexEntry {
    target: Arc<Target>,
    position: Position,
}

pub struct ProximityIndex {
    /// Entries sorted by arrival rank, so that an equal-distance tie in a
    /// stable sort resolves to insertion order.
    snapshot: RwLock<Arc<Vec<IndexEntry>>>,
}

impl ProximityIndex {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Rebuild the snapshot from current registry state. Targets with no
    /// known position are not indexed.
    pub fn rebuild_from(&self, registry: &TargetRegistry) {
        let mut targets = registry.all();
        targets.sort_by_key(|target| target.insertion_order());

        let entries: Vec<IndexEntry> = targets
            .into_iter()
            .filter_map(|target| {
                target.position().map(|fix| IndexEntry {
                    position: fix.position,
                    target,
                })
            })
            .collect();
        trace!(indexed = entries.len(), "proximity snapshot rebuilt");
        *self.snapshot.write() = Arc::new(entries);
    }

    /// Targets nearest to `origin`, ascending by distance.
    ///
    /// Excludes the origin target itself and anything unpositioned; a
    /// non-positive `max_distance_m` disables the distance filter. Returns
    /// nothing when the origin has no known position.
    pub fn nearest(
        &self,
        origin: &Target,
        max_results: usize,
        max_distance_m: f64,
    ) -> Vec<NearTarget> {
        let mut ranked = self.ranked(origin, max_distance_m);
        ranked.truncate(max_results);
        ranked
    }

    /// `nearest` restricted to targets offering the named service. The
    /// service filter applies before truncation, so closer vessels without
    /// the service never crowd out qualifying ones.
    pub fn find_service(
        &self,
        origin: &Target,
        name: &str,
        max_distance_m: f64,
        max_results: usize,
    ) -> Vec<NearTarget> {
        let mut matches: Vec<NearTarget> = self
            .ranked(origin, max_distance_m)
            .into_iter()
            .filter(|near| near.target.has_service(name))
            .collect();
        matches.truncate(max_results);
        matches
    }

    fn ranked(&self, origin: &Target, max_distance_m: f64) -> Vec<NearTarget> {
        let Some(origin_fix) = origin.position() else {
            return Vec::new();
        };
        let snapshot = self.snapshot.read().clone();

        let mut ranked: Vec<NearTarget> = snapshot
            .iter()
            .filter(|entry| entry.target.id() != origin.id())
            .map(|entry| NearTarget {
                target: entry.target.clone(),
                distance_m: origin_fix.position.distance_to(&entry.position),
            })
            .filter(|near| max_distance_m <= 0.0 || near.distance_m <= max_distance_m)
            .collect();
        // Stable sort: equal distances keep snapshot (insertion) order.
        ranked.sort_by(|a, b| {
            a.distance_m
                .partial_cmp(&b.distance_m)
                .unwrap_or(Ordering::Equal)
        });
        ranked
    }
}

impl Default for ProximityIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuild the index from the registry on a fixed period until aborted.
pub fn spawn_rebuild_task(
    index: Arc<ProximityIndex>,
    registry: Arc<TargetRegistry>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(period_ms = period.as_millis() as u64, "proximity rebuild task started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            index.rebuild_from(&registry);
        }
    })
}
