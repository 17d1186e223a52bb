//! Broadcast fan-out.
//!
//! A broadcast is delivered from the sender's position at send time to every
//! other live vessel strictly inside the radius. Vessels with no known
//! position are skipped. Delivery and ack-relay are decoupled per target:
//! one unreachable receiver never blocks or fails the others, and the
//! sender's own send-ack is issued regardless of how many deliveries
//! happened.

use crate::dispatch::PeerContext;
use fairway_types::{Body, BroadcastAck, BroadcastDeliver, BroadcastSend, Position};
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Fan a broadcast out to every qualifying live target. Returns the number
/// of accepted deliveries.
pub fn fan_out(ctx: &PeerContext, seq: u64, request: &BroadcastSend) -> usize {
    let origin = Position::new(request.lat, request.lon);
    let sender_id = ctx.target.id();
    let mut delivered = 0;

    ctx.metrics.broadcasts.fetch_add(1, Ordering::Relaxed);

    for target in ctx.registry.all() {
        if target.id() == sender_id {
            continue;
        }
        let Some(connection) = target.connection().filter(|c| c.has_transport()) else {
            continue;
        };
        let Some(fix) = target.position() else {
            // Unpositioned vessels cannot be ranged against; skip them.
            continue;
        };
        let distance = origin.distance_to(&fix.position);
        if distance >= request.radius_m {
            continue;
        }

        let deliver = Body::BroadcastDeliver(BroadcastDeliver {
            source: sender_id.clone(),
            payload: request.payload.clone(),
            lat: request.lat,
            lon: request.lon,
        });
        match connection.send(deliver) {
            Ok(_) => {
                delivered += 1;
                ctx.metrics.broadcast_deliveries.fetch_add(1, Ordering::Relaxed);
                if request.receiver_ack {
                    // Acceptance by the receiver's reliable channel is what
                    // is acknowledged here, not the remote peer's receipt.
                    let ack = Body::BroadcastAck(BroadcastAck {
                        reply_to_seq: seq,
                        receiver: target.id().clone(),
                        position: Some(fix.position),
                    });
                    if let Err(error) = ctx.session.send(ack) {
                        warn!(%error, "broadcast ack could not be queued to sender");
                    }
                }
            }
            Err(error) => {
                warn!(
                    receiver = %target.id(),
                    %error,
                    "broadcast delivery failed for one target, continuing"
                );
            }
        }
    }

    debug!(
        sender = %sender_id,
        radius_m = request.radius_m,
        delivered,
        "broadcast fanned out"
    );
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::PeerContext;
    use crate::metrics::RelayMetrics;
    use fairway_network::{MemoryTransport, Session};
    use fairway_registry::{ProximityIndex, TargetRegistry};
    use fairway_types::{ConnectionId, VesselId};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct LiveVessel {
        session: Arc<Session>,
        _frames: mpsc::UnboundedReceiver<String>,
    }

    fn join(registry: &TargetRegistry, id: &str, position: Option<Position>) -> LiveVessel {
        let target = registry.get_or_create(&VesselId::new(id));
        if let Some(position) = position {
            target.update_position(position);
        }
        let (session, _inbound) = Session::new(ConnectionId::generate());
        let (link, frames) = MemoryTransport::pair();
        session.attach_transport(link);
        target.attach_connection(session.clone());
        LiveVessel { session, _frames: frames }
    }

    fn sender_context(registry: Arc<TargetRegistry>, id: &str) -> PeerContext {
        let target = registry.get_or_create(&VesselId::new(id));
        let (session, _inbound) = Session::new(ConnectionId::generate());
        PeerContext {
            target,
            session,
            registry,
            index: Arc::new(ProximityIndex::new()),
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    #[test]
    fn only_targets_inside_the_radius_receive_the_broadcast() {
        let registry = Arc::new(TargetRegistry::new());
        let near = join(&registry, "near", Some(Position::new(0.001, 0.0)));
        let far = join(&registry, "far", Some(Position::new(10.0, 10.0)));
        let ctx = sender_context(registry, "sender");

        let request = BroadcastSend {
            payload: serde_json::json!({"msg": "all ships"}),
            lat: 0.0,
            lon: 0.0,
            radius_m: 200.0,
            receiver_ack: false,
        };
        let delivered = fan_out(&ctx, 1, &request);

        assert_eq!(delivered, 1);
        assert_eq!(near.session.unacked_seqs(), vec![1]);
        assert!(far.session.unacked_seqs().is_empty());
    }

    #[test]
    fn unpositioned_and_offline_targets_are_skipped() {
        let registry = Arc::new(TargetRegistry::new());
        let silent = join(&registry, "silent", None);
        // Positioned but with no live connection.
        registry
            .get_or_create(&VesselId::new("offline"))
            .update_position(Position::new(0.0001, 0.0));
        let ctx = sender_context(registry, "sender");

        let request = BroadcastSend {
            payload: serde_json::json!({}),
            lat: 0.0,
            lon: 0.0,
            radius_m: 1_000_000.0,
            receiver_ack: false,
        };
        assert_eq!(fan_out(&ctx, 1, &request), 0);
        assert!(silent.session.unacked_seqs().is_empty());
    }

    #[test]
    fn receiver_acks_flow_back_to_the_sender() {
        let registry = Arc::new(TargetRegistry::new());
        let _near = join(&registry, "near", Some(Position::new(0.0005, 0.0)));
        let ctx = sender_context(registry, "sender");

        let request = BroadcastSend {
            payload: serde_json::json!({}),
            lat: 0.0,
            lon: 0.0,
            radius_m: 500.0,
            receiver_ack: true,
        };
        fan_out(&ctx, 42, &request);

        // One BroadcastAck queued on the sender's connection.
        assert_eq!(ctx.session.unacked_seqs().len(), 1);
    }

    #[test]
    fn one_closed_receiver_does_not_block_the_rest() {
        let registry = Arc::new(TargetRegistry::new());
        let broken = join(&registry, "broken", Some(Position::new(0.0002, 0.0)));
        broken.session.close();
        let healthy = join(&registry, "healthy", Some(Position::new(0.0004, 0.0)));
        let ctx = sender_context(registry, "sender");

        let request = BroadcastSend {
            payload: serde_json::json!({}),
            lat: 0.0,
            lon: 0.0,
            radius_m: 500.0,
            receiver_ack: false,
        };
        let delivered = fan_out(&ctx, 1, &request);
        assert_eq!(delivered, 1);
        assert_eq!(healthy.session.unacked_seqs(), vec![1]);
    }
}
