//! # Fairway Wire Codec
//!
//! Text-frame encoding of envelopes. Every frame is
//!
//! ```text
//! <tag> <seq> <ack> <body-json>
//! ```
//!
//! with the control fields in the same position for every envelope type, so
//! the reliable-delivery layer can read them without knowing the tag. The
//! body is one JSON object whose shape is fixed per tag; encode/decode is a
//! free function pair per tag dispatched from a single match, no message
//! class hierarchy.

pub mod error;

pub use error::{CodecError, Result};

use fairway_types::{
    tag, Body, BroadcastAck, BroadcastDeliver, BroadcastSend, Close, Envelope, FindService, Hello,
    PositionReport, RegisterService, RelayMessage, SendAck, ServiceFound, SessionConfirm, Welcome,
};

/// Encode an envelope into one text frame.
pub fn encode(envelope: &Envelope) -> String {
    let body = encode_body(&envelope.body);
    format!("{} {} {} {}", envelope.body.tag(), envelope.seq, envelope.ack, body)
}

/// Decode one text frame into an envelope.
pub fn decode(frame: &str) -> Result<Envelope> {
    let mut parts = frame.splitn(4, ' ');
    let tag_text = parts.next().filter(|s| !s.is_empty()).ok_or(
        CodecError::MalformedFrame { reason: "empty frame" },
    )?;
    let seq_text = parts.next().ok_or(CodecError::MalformedFrame {
        reason: "missing sequence field",
    })?;
    let ack_text = parts.next().ok_or(CodecError::MalformedFrame {
        reason: "missing ack field",
    })?;
    let body_text = parts.next().ok_or(CodecError::MalformedFrame {
        reason: "missing body",
    })?;

    let tag_value: u16 = tag_text.parse().map_err(|_| CodecError::InvalidControlField {
        field: "tag",
        value: tag_text.to_string(),
    })?;
    let seq: u64 = seq_text.parse().map_err(|_| CodecError::InvalidControlField {
        field: "seq",
        value: seq_text.to_string(),
    })?;
    let ack: u64 = ack_text.parse().map_err(|_| CodecError::InvalidControlField {
        field: "ack",
        value: ack_text.to_string(),
    })?;

    let body = decode_body(tag_value, body_text)?;
    Ok(Envelope { seq, ack, body })
}

fn encode_body(body: &Body) -> String {
    // Serialization of these derive-only structs cannot fail.
    match body {
        Body::Hello(b) => to_json(b),
        Body::Welcome(b) => to_json(b),
        Body::SessionConfirm(b) => to_json(b),
        Body::Ping | Body::Pong => "{}".to_string(),
        Body::Close(b) => to_json(b),
        Body::PositionReport(b) => to_json(b),
        Body::Relay(b) => to_json(b),
        Body::BroadcastSend(b) => to_json(b),
        Body::BroadcastDeliver(b) => to_json(b),
        Body::BroadcastAck(b) => to_json(b),
        Body::SendAck(b) => to_json(b),
        Body::RegisterService(b) => to_json(b),
        Body::FindService(b) => to_json(b),
        Body::ServiceFound(b) => to_json(b),
    }
}

fn decode_body(tag_value: u16, body: &str) -> Result<Body> {
    let result = match tag_value {
        tag::HELLO => from_json::<Hello>(body).map(Body::Hello),
        tag::WELCOME => from_json::<Welcome>(body).map(Body::Welcome),
        tag::SESSION_CONFIRM => from_json::<SessionConfirm>(body).map(Body::SessionConfirm),
        tag::PING => Ok(Body::Ping),
        tag::PONG => Ok(Body::Pong),
        tag::CLOSE => from_json::<Close>(body).map(Body::Close),
        tag::POSITION_REPORT => from_json::<PositionReport>(body).map(Body::PositionReport),
        tag::RELAY => from_json::<RelayMessage>(body).map(Body::Relay),
        tag::BROADCAST_SEND => from_json::<BroadcastSend>(body).map(Body::BroadcastSend),
        tag::BROADCAST_DELIVER => from_json::<BroadcastDeliver>(body).map(Body::BroadcastDeliver),
        tag::BROADCAST_ACK => from_json::<BroadcastAck>(body).map(Body::BroadcastAck),
        tag::SEND_ACK => from_json::<SendAck>(body).map(Body::SendAck),
        tag::REGISTER_SERVICE => from_json::<RegisterService>(body).map(Body::RegisterService),
        tag::FIND_SERVICE => from_json::<FindService>(body).map(Body::FindService),
        tag::SERVICE_FOUND => from_json::<ServiceFound>(body).map(Body::ServiceFound),
        other => return Err(CodecError::UnknownTag { tag: other }),
    };
    result.map_err(|source| CodecError::InvalidBody { tag: tag_value, source })
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).expect("derive-only body serialization")
}

fn from_json<T: serde::de::DeserializeOwned>(body: &str) -> serde_json::Result<T> {
    serde_json::from_str(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairway_types::Position;

    #[test]
    fn control_fields_sit_in_fixed_positions() {
        let envelope = Envelope {
            seq: 7,
            ack: 3,
            body: Body::PositionReport(PositionReport { lat: 1.5, lon: -2.5 }),
        };
        let frame = encode(&envelope);
        let parts: Vec<&str> = frame.splitn(4, ' ').collect();
        assert_eq!(parts[0], "10");
        assert_eq!(parts[1], "7");
        assert_eq!(parts[2], "3");
        assert!(parts[3].starts_with('{'));
    }

    #[test]
    fn hello_round_trip() {
        let envelope = Envelope::control(Body::Hello(Hello {
            vessel_id: "mv-aurora".into(),
            vessel_info: "test build".into(),
            resume_token: None,
            last_received: 12,
            position: Some(Position::new(55.0, 12.0)),
        }));
        let decoded = decode(&encode(&envelope)).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn ping_has_empty_body() {
        let frame = encode(&Envelope::control(Body::Ping));
        assert_eq!(frame, "4 0 0 {}");
        assert_eq!(decode(&frame).unwrap().body, Body::Ping);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decode("999 0 0 {}").unwrap_err();
        assert!(matches!(err, CodecError::UnknownTag { tag: 999 }));
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(
            decode(""),
            Err(CodecError::MalformedFrame { .. })
        ));
        assert!(matches!(
            decode("10 5"),
            Err(CodecError::MalformedFrame { .. })
        ));
        assert!(matches!(
            decode("ten 0 0 {}"),
            Err(CodecError::InvalidControlField { field: "tag", .. })
        ));
        assert!(matches!(
            decode("10 x 0 {}"),
            Err(CodecError::InvalidControlField { field: "seq", .. })
        ));
    }

    #[test]
    fn body_shape_mismatch_is_rejected() {
        // RELAY requires msg_id/source/destination/payload.
        let err = decode("11 1 0 {\"source\":\"a\"}").unwrap_err();
        assert!(matches!(err, CodecError::InvalidBody { tag: 11, .. }));
    }

    #[test]
    fn relay_payload_stays_opaque() {
        let envelope = Envelope {
            seq: 2,
            ack: 0,
            body: Body::Relay(RelayMessage {
                msg_id: uuid_for_test(),
                source: "a".into(),
                destination: "b".into(),
                reply_to: None,
                payload: serde_json::json!({"op": "route", "nested": [1, 2, 3]}),
            }),
        };
        let decoded = decode(&encode(&envelope)).unwrap();
        assert_eq!(decoded, envelope);
    }

    fn uuid_for_test() -> uuid::Uuid {
        "6c0efa10-79b6-4e03-8c37-d3f0d7b0c4a1".parse().unwrap()
    }
}
