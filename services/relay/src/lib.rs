//! # Fairway Relay Service
//!
//! The central relay vessels connect to: routes point-to-point messages,
//! fans out proximity broadcasts, answers service-discovery queries, and
//! keeps logical connections resumable across transport drops.

pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod liveness;
pub mod metrics;
pub mod server;

pub use config::{resolve_config_path, RelayConfig};
pub use error::{RelayError, Result};
pub use metrics::RelayMetrics;
pub use server::RelayServer;
