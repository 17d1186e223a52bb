//! The relay server: WebSocket accept loop, handshake, and per-connection
//! socket tasks.
//!
//! Each accepted socket performs the HELLO → WELCOME + CONNECTED exchange,
//! then feeds decoded frames into the connection's reliable session, whose
//! pump dispatches them. A HELLO presenting a known resumption token
//! reattaches the new transport to the existing logical connection and the
//! unconfirmed outgoing suffix replays automatically; an unknown token
//! downgrades to a fresh connection. Socket loss detaches the transport but
//! keeps the connection for later resumption or eviction.

use crate::config::RelayConfig;
use crate::dispatch::{Dispatcher, HandlerMap, PeerContext};
use crate::error::{RelayError, Result};
use crate::handlers::default_handlers;
use crate::liveness;
use crate::metrics::RelayMetrics;
use fairway_network::{spawn_pump, PumpConfig, Session, Transport, WsTransport};
use fairway_registry::{spawn_rebuild_task, ProximityIndex, Target, TargetRegistry};
use fairway_types::{Body, Close, Envelope, Hello, SessionConfirm, Welcome, PROTOCOL_VERSION};
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

type WsReader = futures_util::stream::SplitStream<WebSocketStream<TcpStream>>;

pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<TargetRegistry>,
    index: Arc<ProximityIndex>,
    metrics: Arc<RelayMetrics>,
    handlers: Arc<HandlerMap>,
    shutdown: Notify,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Arc::new(TargetRegistry::new()),
            index: Arc::new(ProximityIndex::new()),
            metrics: Arc::new(RelayMetrics::new()),
            handlers: default_handlers(),
            shutdown: Notify::new(),
        })
    }

    pub fn registry(&self) -> Arc<TargetRegistry> {
        self.registry.clone()
    }

    pub fn index(&self) -> Arc<ProximityIndex> {
        self.index.clone()
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = &self.config.server.listen_addr;
        TcpListener::bind(addr).await.map_err(|source| RelayError::Bind {
            addr: addr.clone(),
            source,
        })
    }

    /// Accept connections until `shutdown` is called. Also drives the
    /// proximity rebuild and eviction sweeps.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        let local_addr = listener.local_addr().ok();
        info!(addr = ?local_addr, server_id = %self.config.server.server_id, "relay listening");

        let rebuild = spawn_rebuild_task(
            self.index.clone(),
            self.registry.clone(),
            self.config.rebuild_interval(),
        );
        let sweep = liveness::spawn_eviction_sweep(
            self.registry.clone(),
            self.metrics.clone(),
            self.config.eviction_retention(),
            self.config.sweep_interval(),
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            server.handle_socket(stream, peer_addr).await;
                        });
                    }
                    Err(error) => {
                        warn!(%error, "accept failed");
                    }
                },
            }
        }

        rebuild.abort();
        sweep.abort();
        self.close_connections().await;
        info!(metrics = %self.metrics, "relay stopped");
    }

    /// Ask `run` to stop accepting and close live connections.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn close_connections(&self) {
        for target in self.registry.all() {
            if let Some(session) = target.drop_connection() {
                if let Some(transport) = session.current_transport() {
                    let close = Envelope::control(Body::Close(Close {
                        reason: "server shutting down".to_string(),
                    }));
                    let _ = transport.send_text(fairway_codec::encode(&close)).await;
                    transport.close().await;
                }
                session.close();
            }
        }
    }

    async fn handle_socket(self: Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(error) => {
                warn!(%peer_addr, %error, "websocket handshake failed");
                return;
            }
        };
        let (sink, mut reader) = ws.split();
        let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(sink));

        let hello = match self.await_hello(&mut reader).await {
            Ok(hello) => hello,
            Err(error) => {
                warn!(%peer_addr, %error, "connection rejected");
                transport.close().await;
                return;
            }
        };

        self.metrics.connections_accepted.fetch_add(1, Ordering::Relaxed);
        let target = self.registry.get_or_create(&hello.vessel_id);
        if let Some(position) = hello.position {
            target.update_position(position);
        }

        let (session, resumed) = self.establish(&target, &hello);
        info!(
            vessel = %hello.vessel_id,
            %peer_addr,
            connection = %session.connection_id(),
            resumed,
            "vessel connected"
        );

        // Confirm before wiring the transport in: replayed envelopes must
        // not reach the wire ahead of WELCOME and CONNECTED.
        if let Err(error) = self.confirm(&transport, &session).await {
            warn!(vessel = %hello.vessel_id, %error, "handshake reply failed");
            return;
        }
        if resumed {
            session.resume(transport.clone(), hello.last_received);
            target.note_transport_restored();
        } else {
            session.attach_transport(transport.clone());
        }

        self.read_frames(&mut reader, &target, &session, &transport).await;

        transport.close().await;
        if session.detach_if_current(&transport) {
            target.note_transport_lost(&session);
            info!(
                vessel = %target.id(),
                connection = %session.connection_id(),
                "transport lost, connection retained for resumption"
            );
        }
    }

    /// The first frame of every socket must be HELLO, within the timeout.
    async fn await_hello(&self, reader: &mut WsReader) -> Result<Hello> {
        let deadline = tokio::time::sleep(self.config.handshake_timeout());
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(RelayError::Handshake {
                        reason: "no HELLO before timeout".to_string(),
                    });
                }
                frame = reader.next() => {
                    let text = match frame {
                        None => {
                            return Err(RelayError::Handshake {
                                reason: "socket closed before HELLO".to_string(),
                            })
                        }
                        Some(Err(error)) => {
                            return Err(RelayError::Handshake {
                                reason: format!("socket error before HELLO: {error}"),
                            })
                        }
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) => {
                            return Err(RelayError::Handshake {
                                reason: "peer closed before HELLO".to_string(),
                            })
                        }
                        // WebSocket-level keepalive is not a protocol frame.
                        Some(Ok(_)) => continue,
                    };
                    let envelope = fairway_codec::decode(&text).map_err(|error| {
                        RelayError::Handshake {
                            reason: format!("malformed first frame: {error}"),
                        }
                    })?;
                    return match envelope.body {
                        Body::Hello(hello) => Ok(hello),
                        other => Err(RelayError::Handshake {
                            reason: format!("expected HELLO, got tag {}", other.tag()),
                        }),
                    };
                }
            }
        }
    }

    /// Pick the logical connection this socket belongs to: the existing one
    /// when the resumption token matches, a fresh one otherwise. The caller
    /// wires the transport in after confirming the handshake.
    fn establish(&self, target: &Arc<Target>, hello: &Hello) -> (Arc<Session>, bool) {
        if let Some(token) = hello.resume_token {
            if let Some(existing) = target.connection() {
                if existing.connection_id() == token && !existing.is_closed() {
                    self.metrics.connections_resumed.fetch_add(1, Ordering::Relaxed);
                    return (existing, true);
                }
            }
            self.metrics.resumption_mismatches.fetch_add(1, Ordering::Relaxed);
            info!(
                vessel = %hello.vessel_id,
                presented = %token,
                "resumption token unknown, treating peer as new"
            );
        }

        let (session, inbound_rx) = Session::new(fairway_types::ConnectionId::generate());

        let dispatcher = Arc::new(Dispatcher::new(
            PeerContext {
                target: target.clone(),
                session: session.clone(),
                registry: self.registry.clone(),
                index: self.index.clone(),
                metrics: self.metrics.clone(),
            },
            self.handlers.clone(),
        ));
        spawn_pump(
            session.clone(),
            inbound_rx,
            dispatcher,
            PumpConfig {
                transport_backoff: self.config.transport_backoff(),
            },
        );

        if let Some(displaced) = target.attach_connection(session.clone()) {
            debug!(vessel = %target.id(), "superseding previous connection");
            displaced.close();
        }
        (session, false)
    }

    async fn confirm(&self, transport: &Arc<dyn Transport>, session: &Arc<Session>) -> fairway_network::Result<()> {
        let welcome = Envelope::control(Body::Welcome(Welcome {
            protocol_version: PROTOCOL_VERSION,
            server_id: self.config.server.server_id.clone(),
            server_info: self.config.server.server_info.clone(),
        }));
        transport.send_text(fairway_codec::encode(&welcome)).await?;

        let confirm = Envelope::control(Body::SessionConfirm(SessionConfirm {
            connection_id: session.connection_id(),
            last_received: session.highest_received(),
        }));
        transport.send_text(fairway_codec::encode(&confirm)).await
    }

    /// Read frames until the socket drops, the peer closes, the idle
    /// timeout hits, or the peer violates the protocol.
    async fn read_frames(
        &self,
        reader: &mut WsReader,
        target: &Arc<Target>,
        session: &Arc<Session>,
        transport: &Arc<dyn Transport>,
    ) {
        let heartbeat = self.config.heartbeat_interval();
        let idle_timeout = self.config.idle_timeout();
        let mut last_activity = Instant::now();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);

        loop {
            tokio::select! {
                frame = reader.next() => {
                    let text = match frame {
                        None => return,
                        Some(Err(error)) => {
                            debug!(vessel = %target.id(), %error, "socket read failed");
                            return;
                        }
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) => return,
                        Some(Ok(_)) => {
                            last_activity = Instant::now();
                            continue;
                        }
                    };
                    last_activity = Instant::now();
                    match fairway_codec::decode(&text) {
                        Ok(envelope) => {
                            if !self.handle_frame(target, session, transport, envelope).await {
                                return;
                            }
                        }
                        Err(error) => {
                            // Malformed frames are connection-fatal.
                            warn!(vessel = %target.id(), %error, "protocol violation, closing");
                            self.metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if last_activity.elapsed() >= idle_timeout {
                        warn!(vessel = %target.id(), "idle timeout, closing transport");
                        return;
                    }
                    let ping = fairway_codec::encode(&Envelope::control(Body::Ping));
                    if transport.send_text(ping).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Returns false when the connection should stop reading.
    async fn handle_frame(
        &self,
        target: &Arc<Target>,
        session: &Arc<Session>,
        transport: &Arc<dyn Transport>,
        envelope: Envelope,
    ) -> bool {
        let Envelope { seq, ack, body } = envelope;
        match body {
            Body::Ping => {
                let pong = fairway_codec::encode(&Envelope::control(Body::Pong));
                transport.send_text(pong).await.is_ok()
            }
            Body::Pong => true,
            Body::Close(close) => {
                info!(vessel = %target.id(), reason = %close.reason, "peer closed connection");
                target.drop_connection();
                session.close();
                false
            }
            body @ (Body::Hello(_) | Body::Welcome(_) | Body::SessionConfirm(_)) => {
                warn!(
                    vessel = %target.id(),
                    tag = body.tag(),
                    "unexpected control frame mid-session, closing"
                );
                self.metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                false
            }
            body => session.enqueue_inbound(Envelope { seq, ack, body }).is_ok(),
        }
    }
}
