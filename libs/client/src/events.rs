//! Application-facing events delivered by the client.

use fairway_types::{Position, RelayMessage, VesselId};
use serde_json::Value;

#[derive(Debug)]
pub enum VesselEvent {
    /// A peer-to-peer message addressed to this vessel (not a reply to a
    /// pending `invoke`; those complete their futures instead).
    MessageReceived(RelayMessage),

    /// A broadcast from a nearby vessel.
    BroadcastReceived {
        source: VesselId,
        payload: Value,
        position: Position,
    },

    /// A receiver acknowledged one of our broadcasts.
    BroadcastAckReceived {
        broadcast_seq: u64,
        receiver: VesselId,
        position: Option<Position>,
    },

    /// The transport dropped; resumption is being attempted.
    Disconnected,

    /// The logical connection was resumed over a new transport.
    Resumed,

    /// The connection is over: server close, or local `close`.
    Terminated { reason: String },
}
