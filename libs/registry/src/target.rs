//! Server-side record of one known peer.

use fairway_network::Session;
use fairway_types::{Position, PositionFix, VesselId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// A known vessel, live or not.
///
/// The record is created lazily on first reference and persists across
/// disconnects so the logical connection can be resumed and the vessel stays
/// visible to service lookups while offline.
pub struct Target {
    id: VesselId,
    /// Arrival rank, used as the stable tie-break in proximity queries.
    order: u64,
    link: Mutex<LinkState>,
    position: RwLock<Option<PositionFix>>,
    services: RwLock<HashSet<String>>,
}

struct LinkState {
    connection: Option<Arc<Session>>,
    detached_at: Option<Instant>,
}

impl Target {
    pub(crate) fn new(id: VesselId, order: u64) -> Self {
        Self {
            id,
            order,
            link: Mutex::new(LinkState {
                connection: None,
                detached_at: None,
            }),
            position: RwLock::new(None),
            services: RwLock::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> &VesselId {
        &self.id
    }

    pub fn insertion_order(&self) -> u64 {
        self.order
    }

    /// Swap in a new logical connection. At most one connection is attached
    /// at any instant: a previous one is displaced inside the same critical
    /// section and returned so the caller can dispose of it.
    pub fn attach_connection(&self, connection: Arc<Session>) -> Option<Arc<Session>> {
        let mut link = self.link.lock();
        let displaced = link.connection.replace(connection);
        link.detached_at = None;
        displaced
    }

    /// Record that `connection`'s transport dropped. The connection object
    /// is retained for resumption; only the detach timestamp is set, which
    /// starts the eviction clock. Ignored when `connection` is no longer
    /// the attached one (a socket task that lost a race with a resume must
    /// not touch the replacement).
    pub fn note_transport_lost(&self, connection: &Arc<Session>) -> bool {
        let mut link = self.link.lock();
        let is_current = link
            .connection
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, connection));
        if is_current {
            link.detached_at = Some(Instant::now());
        }
        is_current
    }

    /// Record that the connection's transport is back (resumption).
    pub fn note_transport_restored(&self) {
        self.link.lock().detached_at = None;
    }

    /// Destroy the logical connection (explicit close or eviction). The
    /// target record itself lives on.
    pub fn drop_connection(&self) -> Option<Arc<Session>> {
        let mut link = self.link.lock();
        link.detached_at = None;
        link.connection.take()
    }

    pub fn connection(&self) -> Option<Arc<Session>> {
        self.link.lock().connection.clone()
    }

    /// Live means reachable right now: a connection with a transport.
    pub fn is_live(&self) -> bool {
        self.link
            .lock()
            .connection
            .as_ref()
            .is_some_and(|connection| connection.has_transport())
    }

    /// When the connection lost its transport, if it is currently detached.
    pub fn detached_since(&self) -> Option<Instant> {
        self.link.lock().detached_at
    }

    /// Store the freshest known position. The proximity index picks it up
    /// on its next scheduled rebuild, not synchronously.
    pub fn update_position(&self, position: Position) {
        *self.position.write() = Some(PositionFix::now(position));
    }

    pub fn position(&self) -> Option<PositionFix> {
        *self.position.read()
    }

    /// Idempotent service registration.
    pub fn register_service(&self, name: &str) -> bool {
        self.services.write().insert(name.to_string())
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.read().contains(name)
    }

    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().iter().cloned().collect();
        names.sort();
        names
    }
}
