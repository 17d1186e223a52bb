//! Transport abstraction.
//!
//! A transport is the write half of one live link: it can push a text frame
//! to the peer and be closed. Receiving is not part of the trait — whoever
//! owns the read half (the relay's socket task, the client's reader) decodes
//! frames and feeds them to the session. At most one transport is attached
//! to a session at any instant; on reconnect the transport is swapped, never
//! duplicated.

use crate::error::{NetworkError, Result};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Push one text frame to the peer.
    async fn send_text(&self, frame: String) -> Result<()>;

    /// Close the link. Best-effort; errors are swallowed.
    async fn close(&self);
}

/// WebSocket write half as a transport.
pub struct WsTransport<S> {
    sink: tokio::sync::Mutex<SplitSink<WebSocketStream<S>, Message>>,
}

impl<S> WsTransport<S> {
    pub fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self {
            sink: tokio::sync::Mutex::new(sink),
        }
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_text(&self, frame: String) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(frame))
            .await
            .map_err(NetworkError::transport_closed)
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.flush().await;
    }
}

/// In-process transport delivering frames over a channel.
///
/// Backs unit and integration tests that need a link they can observe and
/// sever deterministically, without sockets.
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<String>,
    connected: AtomicBool,
}

impl MemoryTransport {
    /// A transport plus the receiving end observing everything it sends.
    pub fn pair() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                tx,
                connected: AtomicBool::new(true),
            }),
            rx,
        )
    }

    /// Simulate an abrupt link loss: subsequent sends fail.
    pub fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&self, frame: String) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(NetworkError::transport_closed("link severed"));
        }
        self.tx
            .send(frame)
            .map_err(|_| NetworkError::transport_closed("receiver dropped"))
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_pair_delivers_frames_in_order() {
        let (transport, mut rx) = MemoryTransport::pair();
        transport.send_text("one".into()).await.unwrap();
        transport.send_text("two".into()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn severed_memory_transport_rejects_sends() {
        let (transport, _rx) = MemoryTransport::pair();
        transport.sever();
        let err = transport.send_text("lost".into()).await.unwrap_err();
        assert!(matches!(err, NetworkError::TransportClosed { .. }));
    }
}
