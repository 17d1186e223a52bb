//! Codec error types.
//!
//! A decode failure means the peer violated the protocol; callers treat it
//! as connection-fatal, unlike routing-level drops which are recoverable.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    /// Frame does not have the `<tag> <seq> <ack> <body>` shape.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: &'static str },

    /// A control field did not parse as an integer.
    #[error("invalid control field {field}: {value:?}")]
    InvalidControlField { field: &'static str, value: String },

    /// Tag is syntactically valid but not part of the protocol.
    #[error("unknown envelope tag {tag}")]
    UnknownTag { tag: u16 },

    /// Body JSON does not match the shape required by the tag.
    #[error("invalid body for tag {tag}: {source}")]
    InvalidBody {
        tag: u16,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CodecError>;
