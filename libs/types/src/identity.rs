//! Vessel and connection identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a peer (vessel), independent of any connection.
///
/// Maritime identifiers are opaque strings here (typically an MMSI or an
/// operator-assigned name); the relay only compares them for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VesselId(String);

impl VesselId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VesselId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VesselId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for VesselId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity of one logical connection, handed to the peer as its resumption
/// token. A new transport presenting a known `ConnectionId` reattaches to
/// the existing session instead of starting a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vessel_id_round_trips_through_serde() {
        let id = VesselId::new("vessel-219000431");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"vessel-219000431\"");
        let back: VesselId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::generate(), ConnectionId::generate());
    }
}
