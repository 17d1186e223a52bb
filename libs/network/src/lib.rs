//! # Fairway Network Layer
//!
//! The reliable, resumable messaging substrate: a `Session` is one logical
//! connection with per-connection sequencing, cumulative acknowledgment and
//! an unacked replay buffer; a `Transport` is whichever live link currently
//! carries it; the connection pump drives both directions of traffic for
//! one session on its own task.
//!
//! Transports may drop and be re-established at any time. A session
//! survives the swap: everything the peer has not confirmed is replayed in
//! order over the next link, and replayed duplicates are suppressed on the
//! receive side, giving the application ordered, at-least-once delivery.

pub mod error;
pub mod pending;
pub mod pump;
pub mod session;
pub mod transport;

pub use error::{NetworkError, Result};
pub use pending::PendingReplies;
pub use pump::{spawn_pump, EnvelopeHandler, PumpConfig};
pub use session::Session;
pub use transport::{MemoryTransport, Transport, WsTransport};
