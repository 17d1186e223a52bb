//! End-to-end test harness: an in-process relay on an ephemeral port plus
//! helpers for driving raw protocol frames when a scenario needs to poke
//! the wire directly.

use fairway_relay::{RelayConfig, RelayServer};
use fairway_types::{Body, Envelope};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type RawSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct RelayHarness {
    pub server: Arc<RelayServer>,
    pub addr: SocketAddr,
    runner: JoinHandle<()>,
}

impl RelayHarness {
    /// Start a relay on an ephemeral port with test-friendly intervals.
    pub async fn start() -> Self {
        let mut config = RelayConfig::default();
        config.server.listen_addr = "127.0.0.1:0".to_string();
        config.server.server_id = "relay-under-test".to_string();
        config.proximity.rebuild_interval_ms = 50;

        let server = RelayServer::new(config);
        let listener = server.bind().await.expect("bind test relay");
        let addr = listener.local_addr().expect("listener addr");
        let runner = tokio::spawn(server.clone().run(listener));
        Self { server, addr, runner }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn stop(self) {
        self.server.shutdown();
        let _ = self.runner.await;
    }
}

/// Open a raw socket to the relay, no handshake.
pub async fn raw_connect(url: &str) -> RawSocket {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("raw websocket connect");
    ws
}

pub async fn send_envelope(ws: &mut RawSocket, envelope: &Envelope) {
    ws.send(Message::Text(fairway_codec::encode(envelope)))
        .await
        .expect("send frame");
}

/// Next protocol envelope, skipping keepalive, within 2 seconds.
pub async fn recv_envelope(ws: &mut RawSocket) -> Envelope {
    recv_envelope_within(ws, Duration::from_secs(2))
        .await
        .expect("expected an envelope before timeout")
}

/// Next protocol envelope, skipping keepalive, or None on timeout.
pub async fn recv_envelope_within(ws: &mut RawSocket, deadline: Duration) -> Option<Envelope> {
    let read = async {
        loop {
            match ws.next().await {
                None => return None,
                Some(Ok(Message::Text(text))) => {
                    let envelope = fairway_codec::decode(&text).expect("decodable frame");
                    if matches!(envelope.body, Body::Ping | Body::Pong) {
                        continue;
                    }
                    return Some(envelope);
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) => return None,
            }
        }
    };
    tokio::time::timeout(deadline, read).await.ok().flatten()
}
