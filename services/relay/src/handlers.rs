//! Built-in request handlers and their registration.

use crate::broadcast;
use crate::dispatch::{HandlerMap, PeerContext, RequestHandler};
use async_trait::async_trait;
use fairway_types::{tag, Body, SendAck, ServiceFound, ServiceMatch};
use std::sync::Arc;
use tracing::debug;

/// The relay's handler map. Resolved once at startup; every connection
/// dispatches through the same table.
pub fn default_handlers() -> Arc<HandlerMap> {
    let mut handlers = HandlerMap::new();
    handlers.insert(tag::POSITION_REPORT, Arc::new(PositionReportHandler));
    handlers.insert(tag::REGISTER_SERVICE, Arc::new(RegisterServiceHandler));
    handlers.insert(tag::FIND_SERVICE, Arc::new(FindServiceHandler));
    handlers.insert(tag::BROADCAST_SEND, Arc::new(BroadcastSendHandler));
    Arc::new(handlers)
}

/// Position reports carry nothing beyond the position, which the
/// dispatcher already folded into the target. No reply.
struct PositionReportHandler;

#[async_trait]
impl RequestHandler for PositionReportHandler {
    async fn handle(&self, _ctx: &PeerContext, _seq: u64, _body: Body) -> Option<Body> {
        None
    }
}

/// Idempotent service registration, acknowledged to the caller.
struct RegisterServiceHandler;

#[async_trait]
impl RequestHandler for RegisterServiceHandler {
    async fn handle(&self, ctx: &PeerContext, seq: u64, body: Body) -> Option<Body> {
        let Body::RegisterService(request) = body else {
            return None;
        };
        let newly_added = ctx.target.register_service(&request.name);
        debug!(
            vessel = %ctx.target.id(),
            service = %request.name,
            newly_added,
            "service registered"
        );
        Some(Body::SendAck(SendAck { reply_to_seq: seq }))
    }
}

/// Proximity-filtered service lookup through the index snapshot.
struct FindServiceHandler;

#[async_trait]
impl RequestHandler for FindServiceHandler {
    async fn handle(&self, ctx: &PeerContext, seq: u64, body: Body) -> Option<Body> {
        let Body::FindService(request) = body else {
            return None;
        };
        let matches: Vec<ServiceMatch> = ctx
            .index
            .find_service(&ctx.target, &request.name, request.max_distance_m, request.max_results)
            .into_iter()
            .filter_map(|near| {
                near.target.position().map(|fix| ServiceMatch {
                    vessel_id: near.target.id().clone(),
                    distance_m: near.distance_m,
                    position: fix.position,
                })
            })
            .collect();
        debug!(
            vessel = %ctx.target.id(),
            service = %request.name,
            matches = matches.len(),
            "service lookup answered"
        );
        Some(Body::ServiceFound(ServiceFound { reply_to_seq: seq, matches }))
    }
}

/// Broadcast fan-out; the sender always gets exactly one send-ack,
/// independent of how many vessels the broadcast reached.
struct BroadcastSendHandler;

#[async_trait]
impl RequestHandler for BroadcastSendHandler {
    async fn handle(&self, ctx: &PeerContext, seq: u64, body: Body) -> Option<Body> {
        let Body::BroadcastSend(request) = body else {
            return None;
        };
        broadcast::fan_out(ctx, seq, &request);
        Some(Body::SendAck(SendAck { reply_to_seq: seq }))
    }
}
