//! Client-side errors.

use fairway_network::NetworkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("websocket connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("handshake failed: {reason}")]
    Handshake { reason: String },

    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Broadcasting needs the vessel's own position; report one first.
    #[error("own position unknown")]
    PositionUnknown,

    /// The server answered a request with a body of the wrong type.
    #[error("unexpected reply type (tag {tag})")]
    UnexpectedReply { tag: u16 },

    #[error("client closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
