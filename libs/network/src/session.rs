//! The reliable session: an ordered, at-least-once delivery abstraction
//! over an unreliable, swappable transport.
//!
//! One `Session` is one logical connection. It owns the sequence counters,
//! the cumulative-ack bookkeeping and the buffer of unacknowledged outgoing
//! envelopes; transports come and go underneath it. Transmission is driven
//! by the connection pump through `next_outbound`, which walks the unacked
//! buffer behind a cursor — rewinding the cursor during resumption is what
//! replays exactly the unconfirmed suffix, in order, with no duplicates.

use crate::error::{NetworkError, Result};
use crate::transport::Transport;
use fairway_types::{Body, ConnectionId, Envelope};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::debug;

/// What the pump should do next on the outbound side.
pub(crate) enum OutboundStep {
    /// Nothing left to transmit.
    Idle,
    /// Work is pending but no transport is attached; back off and retry.
    NoTransport,
    /// Session closed; stop pumping.
    Closed,
    /// Transmit this frame over this transport.
    Frame {
        seq: u64,
        frame: String,
        transport: Arc<dyn Transport>,
    },
}

struct SessionState {
    /// Next sequence id to assign. Ids start at 1 and never reset for the
    /// lifetime of the logical connection.
    next_send_id: u64,
    /// Highest sequence id received from the peer.
    highest_received: u64,
    /// Highest id this side has told the peer it received.
    highest_acked_by_self: u64,
    /// Highest sequence id handed to a transport. Entries above the cursor
    /// are awaiting transmission; rewinding it schedules retransmission.
    transmit_cursor: u64,
    /// Outgoing envelopes not yet covered by a cumulative ack, ascending.
    unacked: VecDeque<(u64, Envelope)>,
    /// Exactly one or zero live transports.
    transport: Option<Arc<dyn Transport>>,
    /// Delivery futures completed when the matching ack prunes the entry.
    delivery_watchers: HashMap<u64, oneshot::Sender<()>>,
    closed: bool,
}

pub struct Session {
    connection_id: ConnectionId,
    state: Mutex<SessionState>,
    outbound_ready: Notify,
    inbound_tx: mpsc::UnboundedSender<Envelope>,
}

impl Session {
    /// Create a session plus the inbound queue its pump will drain.
    pub fn new(connection_id: ConnectionId) -> (Arc<Self>, mpsc::UnboundedReceiver<Envelope>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            connection_id,
            state: Mutex::new(SessionState {
                next_send_id: 1,
                highest_received: 0,
                highest_acked_by_self: 0,
                transmit_cursor: 0,
                unacked: VecDeque::new(),
                transport: None,
                delivery_watchers: HashMap::new(),
                closed: false,
            }),
            outbound_ready: Notify::new(),
            inbound_tx,
        });
        (session, inbound_rx)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Submit a body for reliable delivery. Assigns the next sequence id,
    /// stamps the cumulative ack, and buffers the envelope; it is
    /// transmitted once a transport is attached. Returns the assigned id.
    pub fn send(&self, body: Body) -> Result<u64> {
        self.send_with(body, |_| ()).map(|(seq, _)| seq)
    }

    /// Submit a body and run `register` with the assigned sequence id
    /// before the envelope becomes visible to the pump. A caller that
    /// registers reply interest keyed by the id inside `register` can
    /// therefore never lose a reply to the submission racing ahead of it.
    pub fn send_with<R>(&self, body: Body, register: impl FnOnce(u64) -> R) -> Result<(u64, R)> {
        self.submit(body, None, register)
    }

    /// Like `send`, also returning a future that resolves when the peer's
    /// cumulative ack confirms delivery.
    pub fn send_with_receipt(&self, body: Body) -> Result<(u64, oneshot::Receiver<()>)> {
        let (tx, rx) = oneshot::channel();
        let (seq, _) = self.submit(body, Some(tx), |_| ())?;
        Ok((seq, rx))
    }

    fn submit<R>(
        &self,
        body: Body,
        watcher: Option<oneshot::Sender<()>>,
        register: impl FnOnce(u64) -> R,
    ) -> Result<(u64, R)> {
        let seq;
        let registered;
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(NetworkError::SessionClosed);
            }
            seq = state.next_send_id;
            state.next_send_id += 1;
            let ack = state.highest_received;
            state.highest_acked_by_self = ack;
            state.unacked.push_back((seq, Envelope { seq, ack, body }));
            if let Some(watcher) = watcher {
                state.delivery_watchers.insert(seq, watcher);
            }
            registered = register(seq);
        }
        self.outbound_ready.notify_one();
        Ok((seq, registered))
    }

    /// Queue a decoded envelope for the pump. Called by whoever owns the
    /// transport's read half.
    pub fn enqueue_inbound(&self, envelope: Envelope) -> Result<()> {
        self.inbound_tx
            .send(envelope)
            .map_err(|_| NetworkError::SessionClosed)
    }

    /// Run the receive-side bookkeeping for one envelope: suppress replayed
    /// duplicates, advance the received watermark, and prune the unacked
    /// buffer with the envelope's cumulative ack. Returns the envelope when
    /// it is fresh and should be dispatched to the application.
    pub fn accept_inbound(&self, envelope: Envelope) -> Option<Envelope> {
        if envelope.seq == 0 {
            // Control frames bypass sequencing entirely.
            return Some(envelope);
        }
        let mut state = self.state.lock();
        if envelope.seq <= state.highest_received {
            debug!(
                connection = %self.connection_id,
                seq = envelope.seq,
                watermark = state.highest_received,
                "discarding replayed duplicate"
            );
            return None;
        }
        state.highest_received = envelope.seq;
        let ack = envelope.ack;
        prune_acked(&mut state, ack);
        Some(envelope)
    }

    /// Attach the first transport of a fresh connection.
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        let mut state = self.state.lock();
        state.transport = Some(transport);
        drop(state);
        self.outbound_ready.notify_one();
    }

    /// Detach the current transport, leaving outgoing traffic buffered.
    pub fn detach_transport(&self) {
        self.state.lock().transport = None;
    }

    /// Detach only if `transport` is still the attached one. Guards against
    /// a stale socket task detaching the replacement after a resume swap.
    pub fn detach_if_current(&self, transport: &Arc<dyn Transport>) -> bool {
        let mut state = self.state.lock();
        let is_current = state
            .transport
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, transport));
        if is_current {
            state.transport = None;
        }
        is_current
    }

    /// Resume this logical connection over a new transport.
    ///
    /// Everything the peer confirms having received is pruned; the transmit
    /// cursor rewinds to the confirmation watermark so the pump replays the
    /// remaining buffered envelopes in ascending order before any new sends.
    pub fn resume(&self, transport: Arc<dyn Transport>, peer_last_received: u64) {
        let mut state = self.state.lock();
        prune_acked(&mut state, peer_last_received);
        // An out-of-range claim must not make the cursor skip future sends.
        state.transmit_cursor = peer_last_received.min(state.next_send_id - 1);
        state.transport = Some(transport);
        let replay = state.unacked.len();
        drop(state);
        debug!(
            connection = %self.connection_id,
            peer_last_received,
            replay,
            "transport reattached"
        );
        self.outbound_ready.notify_one();
    }

    pub(crate) fn next_outbound(&self) -> OutboundStep {
        let mut state = self.state.lock();
        if state.closed {
            return OutboundStep::Closed;
        }
        let cursor = state.transmit_cursor;
        let next = state
            .unacked
            .iter()
            .find(|(seq, _)| *seq > cursor)
            .map(|(seq, envelope)| (*seq, fairway_codec::encode(envelope)));
        let Some((seq, frame)) = next else {
            return OutboundStep::Idle;
        };
        let Some(transport) = state.transport.clone() else {
            return OutboundStep::NoTransport;
        };
        state.transmit_cursor = seq;
        OutboundStep::Frame { seq, frame, transport }
    }

    /// Roll back after a failed transmit: drop the broken transport and
    /// rewind the cursor so the envelope is retried on the next link.
    pub(crate) fn on_send_failure(&self, seq: u64, transport: &Arc<dyn Transport>) {
        let mut state = self.state.lock();
        if state
            .transport
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, transport))
        {
            state.transport = None;
        }
        if state.transmit_cursor >= seq {
            state.transmit_cursor = seq - 1;
        }
    }

    pub(crate) async fn wait_outbound_ready(&self) {
        self.outbound_ready.notified().await;
    }

    /// Close the logical session. Buffered envelopes are dropped and any
    /// delivery watchers resolve with an error.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.transport = None;
        state.delivery_watchers.clear();
        drop(state);
        self.outbound_ready.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn has_transport(&self) -> bool {
        self.state.lock().transport.is_some()
    }

    /// The currently attached transport, for control frames that bypass
    /// sequencing (handshake replies, keepalive, explicit close).
    pub fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.state.lock().transport.clone()
    }

    /// Highest sequence id received from the peer, for handshake frames.
    pub fn highest_received(&self) -> u64 {
        self.state.lock().highest_received
    }

    /// Highest id this side has told the peer it received (piggybacked on
    /// the last outgoing envelope).
    pub fn last_ack_sent(&self) -> u64 {
        self.state.lock().highest_acked_by_self
    }

    /// Sequence ids currently awaiting acknowledgment, ascending.
    pub fn unacked_seqs(&self) -> Vec<u64> {
        self.state.lock().unacked.iter().map(|(seq, _)| *seq).collect()
    }
}

fn prune_acked(state: &mut SessionState, up_to: u64) {
    while state
        .unacked
        .front()
        .is_some_and(|(seq, _)| *seq <= up_to)
    {
        if let Some((seq, _)) = state.unacked.pop_front() {
            if let Some(watcher) = state.delivery_watchers.remove(&seq) {
                let _ = watcher.send(());
            }
        }
    }
}
