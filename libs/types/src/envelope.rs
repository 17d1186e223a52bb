//! The flat tagged envelope model.
//!
//! Every protocol message is one `Envelope`: a numeric type tag, the two
//! reliable-delivery control fields in fixed positions (`seq`, `ack`), and a
//! type-specific body. Control envelopes (handshake, keepalive, close) carry
//! `seq = 0` and are never buffered for replay; everything else is assigned
//! a strictly increasing sequence id per logical connection, starting at 1.

use crate::identity::{ConnectionId, VesselId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Wire type tags. Stable numbers: interop depends on them.
pub mod tag {
    pub const HELLO: u16 = 1;
    pub const WELCOME: u16 = 2;
    pub const SESSION_CONFIRM: u16 = 3;
    pub const PING: u16 = 4;
    pub const PONG: u16 = 5;
    pub const CLOSE: u16 = 6;

    pub const POSITION_REPORT: u16 = 10;
    pub const RELAY: u16 = 11;
    pub const BROADCAST_SEND: u16 = 12;
    pub const BROADCAST_DELIVER: u16 = 13;
    pub const BROADCAST_ACK: u16 = 14;
    pub const SEND_ACK: u16 = 15;

    pub const REGISTER_SERVICE: u16 = 20;
    pub const FIND_SERVICE: u16 = 21;
    pub const SERVICE_FOUND: u16 = 22;
}

/// One discrete protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sequence id; 0 means control/unset.
    pub seq: u64,
    /// Cumulative ack: every id up to and including this value was received.
    pub ack: u64,
    pub body: Body,
}

impl Envelope {
    /// A control envelope: no sequence id, no ack piggyback.
    pub fn control(body: Body) -> Self {
        Self { seq: 0, ack: 0, body }
    }
}

/// Tagged message bodies. One variant per wire tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Hello(Hello),
    Welcome(Welcome),
    SessionConfirm(SessionConfirm),
    Ping,
    Pong,
    Close(Close),
    PositionReport(PositionReport),
    Relay(RelayMessage),
    BroadcastSend(BroadcastSend),
    BroadcastDeliver(BroadcastDeliver),
    BroadcastAck(BroadcastAck),
    SendAck(SendAck),
    RegisterService(RegisterService),
    FindService(FindService),
    ServiceFound(ServiceFound),
}

impl Body {
    /// The wire tag for this body.
    pub fn tag(&self) -> u16 {
        match self {
            Body::Hello(_) => tag::HELLO,
            Body::Welcome(_) => tag::WELCOME,
            Body::SessionConfirm(_) => tag::SESSION_CONFIRM,
            Body::Ping => tag::PING,
            Body::Pong => tag::PONG,
            Body::Close(_) => tag::CLOSE,
            Body::PositionReport(_) => tag::POSITION_REPORT,
            Body::Relay(_) => tag::RELAY,
            Body::BroadcastSend(_) => tag::BROADCAST_SEND,
            Body::BroadcastDeliver(_) => tag::BROADCAST_DELIVER,
            Body::BroadcastAck(_) => tag::BROADCAST_ACK,
            Body::SendAck(_) => tag::SEND_ACK,
            Body::RegisterService(_) => tag::REGISTER_SERVICE,
            Body::FindService(_) => tag::FIND_SERVICE,
            Body::ServiceFound(_) => tag::SERVICE_FOUND,
        }
    }

    /// True for handshake/keepalive/close frames that bypass sequencing.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Body::Hello(_)
                | Body::Welcome(_)
                | Body::SessionConfirm(_)
                | Body::Ping
                | Body::Pong
                | Body::Close(_)
        )
    }

    /// The position carried by this body, if any. Position updates are
    /// folded into any message that carries one, not a separate path.
    pub fn carried_position(&self) -> Option<crate::Position> {
        match self {
            Body::Hello(h) => h.position,
            Body::PositionReport(p) => Some(crate::Position::new(p.lat, p.lon)),
            Body::BroadcastSend(b) => Some(crate::Position::new(b.lat, b.lon)),
            _ => None,
        }
    }
}

/// Client → server greeting, both for fresh connects and resumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub vessel_id: VesselId,
    #[serde(default)]
    pub vessel_info: String,
    /// Resumption token from a previous CONNECTED confirmation, if any.
    #[serde(default)]
    pub resume_token: Option<ConnectionId>,
    /// Highest sequence id this client has received from the server.
    #[serde(default)]
    pub last_received: u64,
    #[serde(default)]
    pub position: Option<crate::Position>,
}

/// Server → client greeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub protocol_version: u32,
    pub server_id: String,
    #[serde(default)]
    pub server_info: String,
}

/// Server → client session confirmation (the CONNECTED frame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfirm {
    /// Resumption token for this logical connection.
    pub connection_id: ConnectionId,
    /// Highest sequence id the server had received from this client.
    pub last_received: u64,
}

/// Explicit connection termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Close {
    #[serde(default)]
    pub reason: String,
}

/// Standalone position update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub lat: f64,
    pub lon: f64,
}

/// Peer-to-peer message relayed through the server.
///
/// `msg_id`/`reply_to` correlate end to end: sequence ids are rewritten on
/// the second hop, so they cannot be used across the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub msg_id: Uuid,
    pub source: VesselId,
    pub destination: VesselId,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    pub payload: Value,
}

/// Broadcast request from a vessel, carrying its position at send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastSend {
    pub payload: Value,
    pub lat: f64,
    pub lon: f64,
    /// Deliver to live vessels strictly closer than this many meters.
    pub radius_m: f64,
    /// Relay a BroadcastAck back to the sender per accepted delivery.
    #[serde(default)]
    pub receiver_ack: bool,
}

/// Broadcast delivery to a qualifying vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastDeliver {
    pub source: VesselId,
    pub payload: Value,
    pub lat: f64,
    pub lon: f64,
}

/// Per-receiver acknowledgment relayed back to the broadcast originator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastAck {
    /// Sequence id of the original BroadcastSend on the sender's connection.
    pub reply_to_seq: u64,
    pub receiver: VesselId,
    #[serde(default)]
    pub position: Option<crate::Position>,
}

/// Generic single-hop acknowledgment of a request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendAck {
    pub reply_to_seq: u64,
}

/// Register a named service for the sending vessel. Idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterService {
    pub name: String,
}

/// Proximity query for vessels offering a named service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindService {
    pub name: String,
    /// Non-positive means no distance limit.
    pub max_distance_m: f64,
    pub max_results: usize,
}

/// Reply to FindService, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFound {
    pub reply_to_seq: u64,
    pub matches: Vec<ServiceMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMatch {
    pub vessel_id: VesselId,
    pub distance_m: f64,
    pub position: crate::Position,
}
