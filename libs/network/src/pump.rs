//! The connection pump.
//!
//! One cooperative task per connection drives both directions of traffic:
//! inbound envelopes are dispatched in receive order, outbound envelopes are
//! transmitted in submission order. A preference flag toggles which side is
//! serviced first each iteration so that sustained load on one direction
//! cannot starve the other; when the preferred side has nothing ready the
//! pump falls back to the other side, and when both are idle it parks until
//! either queue signals readiness. Different connections run on independent
//! tasks and never block each other.

use crate::session::{OutboundStep, Session};
use async_trait::async_trait;
use fairway_types::Envelope;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Receives every fresh (non-duplicate) inbound envelope of one connection.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn on_envelope(&self, envelope: Envelope);
}

#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Delay before retrying transmission while no transport is attached.
    pub transport_backoff: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            transport_backoff: Duration::from_millis(25),
        }
    }
}

/// Spawn the pump task for one connection.
pub fn spawn_pump(
    session: Arc<Session>,
    inbound: mpsc::UnboundedReceiver<Envelope>,
    handler: Arc<dyn EnvelopeHandler>,
    config: PumpConfig,
) -> JoinHandle<()> {
    tokio::spawn(run_pump(session, inbound, handler, config))
}

async fn run_pump(
    session: Arc<Session>,
    mut inbound: mpsc::UnboundedReceiver<Envelope>,
    handler: Arc<dyn EnvelopeHandler>,
    config: PumpConfig,
) {
    let mut prefer_inbound = true;

    loop {
        if session.is_closed() {
            break;
        }

        let serviced = if prefer_inbound {
            service_inbound(&session, &mut inbound, handler.as_ref()).await
                || service_outbound(&session, &config).await
        } else {
            service_outbound(&session, &config).await
                || service_inbound(&session, &mut inbound, handler.as_ref()).await
        };
        prefer_inbound = !prefer_inbound;

        if serviced {
            continue;
        }

        // Both sides idle: park until either queue is armed again.
        tokio::select! {
            received = inbound.recv() => match received {
                Some(envelope) => dispatch(&session, handler.as_ref(), envelope).await,
                None => {
                    session.close();
                    break;
                }
            },
            _ = session.wait_outbound_ready() => {}
        }
    }
    debug!(connection = %session.connection_id(), "pump stopped");
}

/// Dispatch at most one queued inbound envelope. Returns whether one was
/// taken off the queue.
async fn service_inbound(
    session: &Arc<Session>,
    inbound: &mut mpsc::UnboundedReceiver<Envelope>,
    handler: &dyn EnvelopeHandler,
) -> bool {
    match inbound.try_recv() {
        Ok(envelope) => {
            dispatch(session, handler, envelope).await;
            true
        }
        Err(mpsc::error::TryRecvError::Empty) => false,
        Err(mpsc::error::TryRecvError::Disconnected) => {
            session.close();
            false
        }
    }
}

async fn dispatch(session: &Arc<Session>, handler: &dyn EnvelopeHandler, envelope: Envelope) {
    if let Some(fresh) = session.accept_inbound(envelope) {
        handler.on_envelope(fresh).await;
    }
}

/// Transmit at most one outbound envelope. Returns whether outbound work
/// consumed this iteration (including a backoff wait with no transport).
async fn service_outbound(session: &Arc<Session>, config: &PumpConfig) -> bool {
    match session.next_outbound() {
        OutboundStep::Idle | OutboundStep::Closed => false,
        OutboundStep::NoTransport => {
            // Retry after a short delay instead of dropping or spinning.
            tokio::time::sleep(config.transport_backoff).await;
            true
        }
        OutboundStep::Frame { seq, frame, transport } => {
            if let Err(error) = transport.send_text(frame).await {
                warn!(
                    connection = %session.connection_id(),
                    seq,
                    %error,
                    "transmit failed, detaching transport"
                );
                session.on_send_failure(seq, &transport);
            }
            true
        }
    }
}
