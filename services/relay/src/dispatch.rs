//! Inbound envelope dispatch.
//!
//! After the reliable session has suppressed duplicates, every fresh
//! envelope lands here. Position updates are folded in first — any message
//! carrying a position refreshes the sender's target, there is no separate
//! path. Relay envelopes are forwarded by destination; everything else is
//! dispatched through a static tag → handler map resolved at registration
//! time. An unregistered tag is logged and dropped, never fatal.

use crate::metrics::RelayMetrics;
use async_trait::async_trait;
use fairway_network::{EnvelopeHandler, Session};
use fairway_registry::{ProximityIndex, Target, TargetRegistry};
use fairway_types::{Body, Envelope};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a handler may need about the connection it serves.
pub struct PeerContext {
    pub target: Arc<Target>,
    pub session: Arc<Session>,
    pub registry: Arc<TargetRegistry>,
    pub index: Arc<ProximityIndex>,
    pub metrics: Arc<RelayMetrics>,
}

/// A request handler for one envelope tag. The returned body, if any, is
/// sent back as the reply over the same connection.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, ctx: &PeerContext, seq: u64, body: Body) -> Option<Body>;
}

/// Static tag → handler mapping, shared by all connections.
pub type HandlerMap = HashMap<u16, Arc<dyn RequestHandler>>;

/// Per-connection dispatcher fed by the connection pump.
pub struct Dispatcher {
    ctx: PeerContext,
    handlers: Arc<HandlerMap>,
}

impl Dispatcher {
    pub fn new(ctx: PeerContext, handlers: Arc<HandlerMap>) -> Self {
        Self { ctx, handlers }
    }

    async fn forward_relay(&self, body: Body) {
        let Body::Relay(message) = body else { return };

        // The destination target is created lazily even on a relay lookup,
        // so it is visible for resumption and discovery from then on.
        let destination = self.ctx.registry.get_or_create(&message.destination);
        let connection = destination.connection().filter(|c| c.has_transport());
        let Some(connection) = connection else {
            warn!(
                source = %message.source,
                destination = %message.destination,
                "relay destination not reachable, dropping envelope"
            );
            self.ctx.metrics.relays_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        // Clone before re-sending: the forwarded envelope gets its own
        // sequence id and must not alias the inbound one across redelivery.
        match connection.send(Body::Relay(message.clone())) {
            Ok(_) => {
                debug!(
                    source = %message.source,
                    destination = %message.destination,
                    "relay forwarded"
                );
                self.ctx.metrics.relays_forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                warn!(
                    destination = %message.destination,
                    %error,
                    "relay destination closed mid-forward, dropping envelope"
                );
                self.ctx.metrics.relays_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[async_trait]
impl EnvelopeHandler for Dispatcher {
    async fn on_envelope(&self, envelope: Envelope) {
        self.ctx
            .metrics
            .envelopes_dispatched
            .fetch_add(1, Ordering::Relaxed);

        if let Some(position) = envelope.body.carried_position() {
            self.ctx.target.update_position(position);
        }

        let Envelope { seq, body, .. } = envelope;
        if let Body::Relay(_) = body {
            self.forward_relay(body).await;
            return;
        }

        let tag = body.tag();
        match self.handlers.get(&tag) {
            Some(handler) => {
                if let Some(reply) = handler.handle(&self.ctx, seq, body).await {
                    if let Err(error) = self.ctx.session.send(reply) {
                        warn!(tag, %error, "reply could not be queued");
                    }
                }
            }
            None => {
                warn!(tag, seq, "no handler registered for envelope type, dropping");
                self.ctx.metrics.unknown_requests.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
