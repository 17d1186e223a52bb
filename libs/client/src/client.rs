//! The vessel-side client.
//!
//! Owns one logical connection to the relay and keeps it alive across
//! transport drops: on socket loss a supervisor task reconnects with
//! exponential backoff plus jitter, presents the resumption token in HELLO,
//! and lets the session replay whatever the relay has not confirmed. The
//! application sees ordered, at-least-once delivery plus futures for its
//! request/reply operations; inbound traffic surfaces on an event stream.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::VesselEvent;
use async_trait::async_trait;
use fairway_network::{
    spawn_pump, EnvelopeHandler, PendingReplies, PumpConfig, Session, Transport, WsTransport,
};
use fairway_types::{
    Body, Close, Envelope, FindService, Hello, Position, PositionReport, RegisterService,
    RelayMessage, ServiceMatch, VesselId, PROTOCOL_VERSION,
};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

type WsReader = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct ClientShared {
    config: ClientConfig,
    link: RwLock<Option<Arc<Session>>>,
    /// Single-hop replies (send-ack, service-found) keyed by request seq.
    replies: PendingReplies<u64, Body>,
    /// End-to-end relay replies keyed by message id.
    invokes: PendingReplies<Uuid, RelayMessage>,
    events: mpsc::UnboundedSender<VesselEvent>,
    own_position: Mutex<Option<Position>>,
    resume_token: Mutex<Option<fairway_types::ConnectionId>>,
    closed: AtomicBool,
}

impl ClientShared {
    fn session(&self) -> Result<Arc<Session>> {
        self.link.read().clone().ok_or(ClientError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct VesselClient {
    shared: Arc<ClientShared>,
    supervisor: JoinHandle<()>,
}

impl VesselClient {
    /// Connect and perform the HELLO → WELCOME + CONNECTED handshake.
    /// Returns the client plus the stream of application events. The first
    /// connection attempt fails loudly; later drops are resumed silently.
    pub async fn connect(
        config: ClientConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<VesselEvent>)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ClientShared {
            own_position: Mutex::new(config.position),
            config,
            link: RwLock::new(None),
            replies: PendingReplies::new(),
            invokes: PendingReplies::new(),
            events: events_tx,
            resume_token: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let (reader, transport, _resumed) = establish_link(&shared).await?;
        let supervisor = tokio::spawn(supervise(shared.clone(), reader, transport));

        Ok((Self { shared, supervisor }, events_rx))
    }

    pub fn vessel_id(&self) -> &VesselId {
        &self.shared.config.vessel_id
    }

    /// Report own position to the relay (reliable, no reply).
    pub fn report_position(&self, position: Position) -> Result<()> {
        *self.shared.own_position.lock() = Some(position);
        let session = self.shared.session()?;
        session.send(Body::PositionReport(PositionReport {
            lat: position.lat,
            lon: position.lon,
        }))?;
        Ok(())
    }

    /// Fire-and-forget message to another vessel. Returns the message id a
    /// remote reply would reference.
    pub fn send_to(&self, destination: VesselId, payload: Value) -> Result<Uuid> {
        let msg_id = Uuid::new_v4();
        let session = self.shared.session()?;
        session.send(Body::Relay(RelayMessage {
            msg_id,
            source: self.shared.config.vessel_id.clone(),
            destination,
            reply_to: None,
            payload,
        }))?;
        Ok(msg_id)
    }

    /// Send to another vessel and await its reply, with the default
    /// request timeout.
    pub async fn invoke(&self, destination: VesselId, payload: Value) -> Result<RelayMessage> {
        self.invoke_with_timeout(destination, payload, self.shared.config.request_timeout)
            .await
    }

    /// Send to another vessel and await its reply. On timeout the future
    /// fails exactly once; the message already sent is not retracted.
    pub async fn invoke_with_timeout(
        &self,
        destination: VesselId,
        payload: Value,
        timeout: Duration,
    ) -> Result<RelayMessage> {
        let msg_id = Uuid::new_v4();
        let rx = self.shared.invokes.register(msg_id);
        let session = self.shared.session()?;
        let sent = session.send(Body::Relay(RelayMessage {
            msg_id,
            source: self.shared.config.vessel_id.clone(),
            destination,
            reply_to: None,
            payload,
        }));
        if let Err(error) = sent {
            self.shared.invokes.forget(&msg_id);
            return Err(error.into());
        }
        Ok(self.shared.invokes.await_reply(msg_id, rx, timeout).await?)
    }

    /// Reply to a received message, correlating by its message id.
    pub fn reply_to(&self, original: &RelayMessage, payload: Value) -> Result<Uuid> {
        let msg_id = Uuid::new_v4();
        let session = self.shared.session()?;
        session.send(Body::Relay(RelayMessage {
            msg_id,
            source: self.shared.config.vessel_id.clone(),
            destination: original.source.clone(),
            reply_to: Some(original.msg_id),
            payload,
        }))?;
        Ok(msg_id)
    }

    /// Broadcast to vessels within `radius_m` of our own position. Resolves
    /// on the relay's send-ack with the broadcast's sequence id, which
    /// subsequent `BroadcastAckReceived` events reference. Requires a known
    /// own position.
    pub async fn broadcast(
        &self,
        payload: Value,
        radius_m: f64,
        receiver_ack: bool,
    ) -> Result<u64> {
        let Some(position) = *self.shared.own_position.lock() else {
            return Err(ClientError::PositionUnknown);
        };
        let reply = self
            .request(Body::BroadcastSend(fairway_types::BroadcastSend {
                payload,
                lat: position.lat,
                lon: position.lon,
                radius_m,
                receiver_ack,
            }))
            .await?;
        match reply {
            Body::SendAck(ack) => Ok(ack.reply_to_seq),
            other => Err(ClientError::UnexpectedReply { tag: other.tag() }),
        }
    }

    /// Register a named service for this vessel. Idempotent.
    pub async fn register_service(&self, name: &str) -> Result<()> {
        let reply = self
            .request(Body::RegisterService(RegisterService { name: name.to_string() }))
            .await?;
        match reply {
            Body::SendAck(_) => Ok(()),
            other => Err(ClientError::UnexpectedReply { tag: other.tag() }),
        }
    }

    /// Find vessels offering `name`, nearest first. A non-positive
    /// `max_distance_m` disables the distance filter.
    pub async fn find_service(
        &self,
        name: &str,
        max_distance_m: f64,
        max_results: usize,
    ) -> Result<Vec<ServiceMatch>> {
        let reply = self
            .request(Body::FindService(FindService {
                name: name.to_string(),
                max_distance_m,
                max_results,
            }))
            .await?;
        match reply {
            Body::ServiceFound(found) => Ok(found.matches),
            other => Err(ClientError::UnexpectedReply { tag: other.tag() }),
        }
    }

    /// Close the connection for good: CLOSE frame, session teardown, no
    /// resumption.
    pub async fn close(self, reason: &str) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Ok(session) = self.shared.session() {
            if let Some(transport) = session.current_transport() {
                let close = Envelope::control(Body::Close(Close {
                    reason: reason.to_string(),
                }));
                let _ = transport.send_text(fairway_codec::encode(&close)).await;
                transport.close().await;
            }
            session.close();
        }
        self.supervisor.abort();
        let _ = self.shared.events.send(VesselEvent::Terminated {
            reason: reason.to_string(),
        });
    }

    /// One request/reply round trip keyed by the request's sequence id.
    /// The waiter is registered before the envelope becomes visible to the
    /// pump, so the reply cannot win the race.
    async fn request(&self, body: Body) -> Result<Body> {
        let session = self.shared.session()?;
        let (seq, rx) = session.send_with(body, |seq| self.shared.replies.register(seq))?;
        Ok(self
            .shared
            .replies
            .await_reply(seq, rx, self.shared.config.request_timeout)
            .await?)
    }
}

/// Routes fresh inbound envelopes: replies complete their futures,
/// everything else becomes an application event.
struct ClientDispatcher {
    shared: Arc<ClientShared>,
}

#[async_trait]
impl EnvelopeHandler for ClientDispatcher {
    async fn on_envelope(&self, envelope: Envelope) {
        match envelope.body {
            Body::SendAck(ack) => {
                let key = ack.reply_to_seq;
                if !self.shared.replies.complete(&key, Body::SendAck(ack)) {
                    debug!(seq = key, "late send-ack, waiter already gone");
                }
            }
            Body::ServiceFound(found) => {
                let key = found.reply_to_seq;
                if !self.shared.replies.complete(&key, Body::ServiceFound(found)) {
                    debug!(seq = key, "late service reply, waiter already gone");
                }
            }
            Body::BroadcastAck(ack) => {
                let _ = self.shared.events.send(VesselEvent::BroadcastAckReceived {
                    broadcast_seq: ack.reply_to_seq,
                    receiver: ack.receiver,
                    position: ack.position,
                });
            }
            Body::BroadcastDeliver(deliver) => {
                let _ = self.shared.events.send(VesselEvent::BroadcastReceived {
                    source: deliver.source,
                    payload: deliver.payload,
                    position: Position::new(deliver.lat, deliver.lon),
                });
            }
            Body::Relay(message) => match message.reply_to {
                Some(reply_to) => {
                    if !self.shared.invokes.complete(&reply_to, message) {
                        debug!(%reply_to, "late relay reply, waiter already gone");
                    }
                }
                None => {
                    let _ = self
                        .shared
                        .events
                        .send(VesselEvent::MessageReceived(message));
                }
            },
            other => {
                debug!(tag = other.tag(), "ignoring unexpected envelope from relay");
            }
        }
    }
}

enum LinkOutcome {
    /// Transport gone; resume over a new one.
    Lost,
    /// Connection is over; stop supervising.
    Terminated,
}

/// Dial the relay and run the handshake. Returns the socket's read half,
/// the attached transport, and whether the session was resumed.
async fn establish_link(
    shared: &Arc<ClientShared>,
) -> Result<(WsReader, Arc<dyn Transport>, bool)> {
    let url = shared.config.url.clone();
    let (ws, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|error| ClientError::Connect {
            url: url.clone(),
            reason: error.to_string(),
        })?;
    let (sink, mut reader) = ws.split();
    let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(sink));

    let token = *shared.resume_token.lock();
    let last_received = shared
        .link
        .read()
        .as_ref()
        .map(|session| session.highest_received())
        .unwrap_or(0);
    let hello = Envelope::control(Body::Hello(Hello {
        vessel_id: shared.config.vessel_id.clone(),
        vessel_info: shared.config.vessel_info.clone(),
        resume_token: token,
        last_received,
        position: *shared.own_position.lock(),
    }));
    transport.send_text(fairway_codec::encode(&hello)).await?;

    let deadline = shared.config.request_timeout;
    let welcome = match next_control(&mut reader, deadline).await? {
        Body::Welcome(welcome) => welcome,
        other => {
            return Err(ClientError::Handshake {
                reason: format!("expected WELCOME, got tag {}", other.tag()),
            })
        }
    };
    if welcome.protocol_version != PROTOCOL_VERSION {
        warn!(
            server = %welcome.server_id,
            theirs = welcome.protocol_version,
            ours = PROTOCOL_VERSION,
            "protocol version mismatch"
        );
    }
    let confirm = match next_control(&mut reader, deadline).await? {
        Body::SessionConfirm(confirm) => confirm,
        other => {
            return Err(ClientError::Handshake {
                reason: format!("expected CONNECTED, got tag {}", other.tag()),
            })
        }
    };

    let resumed = token == Some(confirm.connection_id);
    if resumed {
        let session = shared.session()?;
        session.resume(transport.clone(), confirm.last_received);
        info!(
            connection = %confirm.connection_id,
            replayed_from = confirm.last_received,
            "session resumed"
        );
    } else {
        // Fresh connection: either the first one, or the relay did not
        // recognize our token and reset us. Either way the old session and
        // its pending futures are gone.
        if let Some(old) = shared.link.write().take() {
            old.close();
        }
        shared.replies.fail_all();
        shared.invokes.fail_all();

        let (session, inbound_rx) = Session::new(confirm.connection_id);
        session.attach_transport(transport.clone());
        spawn_pump(
            session.clone(),
            inbound_rx,
            Arc::new(ClientDispatcher { shared: shared.clone() }),
            PumpConfig {
                transport_backoff: shared.config.transport_backoff,
            },
        );
        *shared.link.write() = Some(session);
        *shared.resume_token.lock() = Some(confirm.connection_id);
        info!(connection = %confirm.connection_id, "session established");
    }

    Ok((reader, transport, resumed))
}

/// Next protocol control frame, skipping WebSocket-level noise.
async fn next_control(reader: &mut WsReader, deadline: Duration) -> Result<Body> {
    let read = async {
        loop {
            match reader.next().await {
                None => {
                    return Err(ClientError::Handshake {
                        reason: "socket closed during handshake".to_string(),
                    })
                }
                Some(Err(error)) => {
                    return Err(ClientError::Handshake {
                        reason: format!("socket error during handshake: {error}"),
                    })
                }
                Some(Ok(Message::Text(text))) => {
                    let envelope =
                        fairway_codec::decode(&text).map_err(|error| ClientError::Handshake {
                            reason: format!("malformed handshake frame: {error}"),
                        })?;
                    return Ok(envelope.body);
                }
                Some(Ok(Message::Close(_))) => {
                    return Err(ClientError::Handshake {
                        reason: "peer closed during handshake".to_string(),
                    })
                }
                Some(Ok(_)) => continue,
            }
        }
    };
    tokio::time::timeout(deadline, read)
        .await
        .map_err(|_| ClientError::Handshake {
            reason: "handshake timed out".to_string(),
        })?
}

/// Drive one live link until it drops or the connection terminates, then
/// keep resuming until the client closes.
async fn supervise(shared: Arc<ClientShared>, mut reader: WsReader, mut transport: Arc<dyn Transport>) {
    loop {
        match drive_link(&shared, &mut reader, &transport).await {
            LinkOutcome::Terminated => break,
            LinkOutcome::Lost => {
                if let Ok(session) = shared.session() {
                    session.detach_if_current(&transport);
                }
                if shared.is_closed() {
                    break;
                }
                let _ = shared.events.send(VesselEvent::Disconnected);
            }
        }

        let mut backoff = shared.config.reconnect.initial_backoff;
        loop {
            let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2);
            tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
            if shared.is_closed() {
                return;
            }
            match establish_link(&shared).await {
                Ok((new_reader, new_transport, resumed)) => {
                    reader = new_reader;
                    transport = new_transport;
                    if resumed {
                        let _ = shared.events.send(VesselEvent::Resumed);
                    }
                    break;
                }
                Err(error) => {
                    warn!(%error, backoff_ms = backoff.as_millis() as u64, "reconnect failed");
                    backoff = (backoff * 2).min(shared.config.reconnect.max_backoff);
                }
            }
        }
    }
}

async fn drive_link(
    shared: &Arc<ClientShared>,
    reader: &mut WsReader,
    transport: &Arc<dyn Transport>,
) -> LinkOutcome {
    loop {
        let text = match reader.next().await {
            None => return LinkOutcome::Lost,
            Some(Err(error)) => {
                debug!(%error, "socket read failed");
                return LinkOutcome::Lost;
            }
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) => return LinkOutcome::Lost,
            Some(Ok(_)) => continue,
        };
        let envelope = match fairway_codec::decode(&text) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "protocol violation from relay, dropping link");
                return LinkOutcome::Lost;
            }
        };
        let Envelope { seq, ack, body } = envelope;
        match body {
            Body::Ping => {
                let pong = fairway_codec::encode(&Envelope::control(Body::Pong));
                if transport.send_text(pong).await.is_err() {
                    return LinkOutcome::Lost;
                }
            }
            Body::Pong => {}
            Body::Close(close) => {
                info!(reason = %close.reason, "relay closed the connection");
                if let Ok(session) = shared.session() {
                    session.close();
                }
                let _ = shared.events.send(VesselEvent::Terminated {
                    reason: close.reason,
                });
                return LinkOutcome::Terminated;
            }
            Body::Hello(_) | Body::Welcome(_) | Body::SessionConfirm(_) => {
                warn!("unexpected control frame mid-session, dropping link");
                return LinkOutcome::Lost;
            }
            body => {
                let Ok(session) = shared.session() else {
                    return LinkOutcome::Terminated;
                };
                if session.enqueue_inbound(Envelope { seq, ack, body }).is_err() {
                    return LinkOutcome::Terminated;
                }
            }
        }
    }
}
