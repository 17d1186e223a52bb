//! Client configuration.

use fairway_types::{Position, VesselId};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay endpoint, e.g. `ws://127.0.0.1:9060`.
    pub url: String,
    pub vessel_id: VesselId,
    pub vessel_info: String,
    /// Initial own position, carried in HELLO when known.
    pub position: Option<Position>,
    /// Default deadline for request/reply operations.
    pub request_timeout: Duration,
    /// Pump retry delay while disconnected.
    pub transport_backoff: Duration,
    pub reconnect: ReconnectSettings,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, vessel_id: impl Into<VesselId>) -> Self {
        Self {
            url: url.into(),
            vessel_id: vessel_id.into(),
            vessel_info: String::new(),
            position: None,
            request_timeout: Duration::from_secs(10),
            transport_backoff: Duration::from_millis(25),
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Exponential backoff with jitter for transparent resumption.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(15),
        }
    }
}
