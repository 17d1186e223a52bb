//! Relay configuration.
//!
//! Loaded from a TOML file whose path comes from `FAIRWAY_RELAY_CONFIG`
//! (falling back to `configs/relay.toml`); a missing file means defaults.
//! Every section and field is optional in the file.
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:9060"
//! server_id = "fairway-relay-1"
//!
//! [proximity]
//! rebuild_interval_ms = 1000
//!
//! [liveness]
//! heartbeat_interval_ms = 15000
//! idle_timeout_ms = 45000
//! eviction_retention_secs = 3600
//! ```

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub proximity: ProximitySettings,
    #[serde(default)]
    pub liveness: LivenessSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: String,
    pub server_id: String,
    pub server_info: String,
    /// How long a fresh socket may take to present HELLO.
    pub handshake_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9060".to_string(),
            server_id: "fairway-relay".to_string(),
            server_info: String::new(),
            handshake_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Pump retry delay while a connection has no transport.
    pub transport_backoff_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            transport_backoff_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximitySettings {
    /// Snapshot rebuild period; also the staleness bound of queries.
    pub rebuild_interval_ms: u64,
}

impl Default for ProximitySettings {
    fn default() -> Self {
        Self {
            rebuild_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessSettings {
    /// PING cadence on an idle connection.
    pub heartbeat_interval_ms: u64,
    /// Silence past this closes the transport (connection retained).
    pub idle_timeout_ms: u64,
    /// Detached connections are destroyed after this long.
    pub eviction_retention_secs: u64,
    /// Eviction sweep cadence.
    pub sweep_interval_ms: u64,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 15_000,
            idle_timeout_ms: 45_000,
            eviction_retention_secs: 3_600,
            sweep_interval_ms: 30_000,
        }
    }
}

impl RelayConfig {
    /// Load from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| RelayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| RelayError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.liveness.idle_timeout_ms <= self.liveness.heartbeat_interval_ms {
            return Err(RelayError::ConfigInvalid {
                reason: "liveness.idle_timeout_ms must exceed heartbeat_interval_ms".to_string(),
            });
        }
        if self.proximity.rebuild_interval_ms == 0 {
            return Err(RelayError::ConfigInvalid {
                reason: "proximity.rebuild_interval_ms must be positive".to_string(),
            });
        }
        if self.session.transport_backoff_ms == 0 {
            return Err(RelayError::ConfigInvalid {
                reason: "session.transport_backoff_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.server.handshake_timeout_ms)
    }

    pub fn transport_backoff(&self) -> Duration {
        Duration::from_millis(self.session.transport_backoff_ms)
    }

    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_millis(self.proximity.rebuild_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.liveness.heartbeat_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness.idle_timeout_ms)
    }

    pub fn eviction_retention(&self) -> Duration {
        Duration::from_secs(self.liveness.eviction_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.liveness.sweep_interval_ms)
    }
}

/// Resolve the config file path: env override, else the conventional path.
pub fn resolve_config_path() -> PathBuf {
    std::env::var("FAIRWAY_RELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("configs/relay.toml"))
}
