//! # Fairway Unified Types Library
//!
//! Shared type definitions for the Fairway vessel messaging system:
//! vessel and connection identities, geographic positions, and the flat
//! tagged envelope model used on the wire.
//!
//! ## Design Philosophy
//!
//! - **Flat envelopes**: one `Envelope` struct with fixed-position control
//!   fields (`seq`, `ack`) and a tagged `Body` enum, no message class
//!   hierarchies. Encode/decode per tag lives in `fairway-codec`.
//! - **Distinct identities**: `VesselId` (stable peer identity) and
//!   `ConnectionId` (per logical session resumption token) are separate
//!   newtypes so they cannot be mixed up.
//! - **Opaque payloads**: application payloads are carried as raw JSON
//!   values; the relay never interprets them.

pub mod envelope;
pub mod identity;
pub mod position;

pub use envelope::{
    tag, Body, BroadcastAck, BroadcastDeliver, BroadcastSend, Close, Envelope, FindService, Hello,
    PositionReport, RegisterService, RelayMessage, SendAck, ServiceFound, ServiceMatch,
    SessionConfirm, Welcome,
};
pub use identity::{ConnectionId, VesselId};
pub use position::{Position, PositionFix};

/// Protocol version spoken by this implementation, carried in WELCOME.
pub const PROTOCOL_VERSION: u32 = 1;
