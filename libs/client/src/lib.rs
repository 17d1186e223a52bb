//! # Fairway Client
//!
//! The library vessels embed to talk through a Fairway relay: reliable,
//! resumable messaging with point-to-point sends, proximity broadcasts,
//! service registration and discovery, all over a WebSocket the client
//! transparently re-establishes when it drops.

pub mod client;
pub mod config;
pub mod error;
pub mod events;

pub use client::VesselClient;
pub use config::{ClientConfig, ReconnectSettings};
pub use error::{ClientError, Result};
pub use events::VesselEvent;
