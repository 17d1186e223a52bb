//! Session resumption at the wire level: a vessel drops its socket and
//! reconnects with its resumption token, and the relay replays exactly the
//! unconfirmed suffix of its outgoing envelopes.

use assert_matches::assert_matches;
use fairway_client::{ClientConfig, VesselClient};
use fairway_e2e_tests::{raw_connect, recv_envelope, recv_envelope_within, send_envelope, RelayHarness};
use fairway_types::{Body, ConnectionId, Envelope, Hello, Position, RegisterService, VesselId};
use std::time::Duration;

fn hello(id: &str, token: Option<ConnectionId>, last_received: u64) -> Envelope {
    Envelope::control(Body::Hello(Hello {
        vessel_id: VesselId::new(id),
        vessel_info: "raw test client".to_string(),
        resume_token: token,
        last_received,
        position: Some(Position::new(0.0, 0.0)),
    }))
}

#[tokio::test]
async fn reconnect_replays_only_the_unacknowledged_suffix() {
    let relay = RelayHarness::start().await;

    // First life of the listener connection.
    let mut listener = raw_connect(&relay.url()).await;
    send_envelope(&mut listener, &hello("listener", None, 0)).await;
    assert_matches!(recv_envelope(&mut listener).await.body, Body::Welcome(_));
    let confirm = match recv_envelope(&mut listener).await.body {
        Body::SessionConfirm(confirm) => confirm,
        other => panic!("expected CONNECTED, got tag {}", other.tag()),
    };
    assert_eq!(confirm.last_received, 0);
    let token = confirm.connection_id;

    // Server envelope 1: the ack for a service registration.
    send_envelope(
        &mut listener,
        &Envelope {
            seq: 1,
            ack: 0,
            body: Body::RegisterService(RegisterService { name: "weather".into() }),
        },
    )
    .await;
    let ack = recv_envelope(&mut listener).await;
    assert_eq!(ack.seq, 1);
    assert_matches!(ack.body, Body::SendAck(_));

    // Server envelope 2: a relayed message from another vessel.
    let (speaker, _speaker_events) = VesselClient::connect({
        let mut config = ClientConfig::new(relay.url(), "speaker");
        config.position = Some(Position::new(0.0, 0.0));
        config
    })
    .await
    .expect("speaker connects");
    speaker
        .send_to(VesselId::new("listener"), serde_json::json!({"text": "ahoy"}))
        .expect("relay queued");

    let relayed = recv_envelope(&mut listener).await;
    assert_eq!(relayed.seq, 2);
    assert_matches!(relayed.body, Body::Relay(_));

    // The socket dies before the listener acknowledges envelope 2.
    drop(listener);

    // Second life: resume with the token, confirming only envelope 1.
    let mut listener = raw_connect(&relay.url()).await;
    send_envelope(&mut listener, &hello("listener", Some(token), 1)).await;
    assert_matches!(recv_envelope(&mut listener).await.body, Body::Welcome(_));
    let confirm = match recv_envelope(&mut listener).await.body {
        Body::SessionConfirm(confirm) => confirm,
        other => panic!("expected CONNECTED, got tag {}", other.tag()),
    };
    assert_eq!(
        confirm.connection_id, token,
        "same logical connection resumed"
    );
    assert_eq!(
        confirm.last_received, 1,
        "server remembers what it received from us"
    );

    // Exactly envelope 2 replays; envelope 1 is never retransmitted.
    let replayed = recv_envelope(&mut listener).await;
    assert_eq!(replayed.seq, 2);
    match replayed.body {
        Body::Relay(message) => {
            assert_eq!(message.payload, serde_json::json!({"text": "ahoy"}));
            assert_eq!(message.source, VesselId::new("speaker"));
        }
        other => panic!("expected replayed relay, got tag {}", other.tag()),
    }
    assert!(
        recv_envelope_within(&mut listener, Duration::from_millis(300))
            .await
            .is_none(),
        "nothing beyond the unacknowledged suffix replays"
    );

    relay.stop().await;
}

#[tokio::test]
async fn unknown_resumption_token_downgrades_to_a_fresh_connection() {
    let relay = RelayHarness::start().await;

    let bogus = ConnectionId::generate();
    let mut vessel = raw_connect(&relay.url()).await;
    send_envelope(&mut vessel, &hello("wanderer", Some(bogus), 17)).await;

    assert_matches!(recv_envelope(&mut vessel).await.body, Body::Welcome(_));
    let confirm = match recv_envelope(&mut vessel).await.body {
        Body::SessionConfirm(confirm) => confirm,
        other => panic!("expected CONNECTED, got tag {}", other.tag()),
    };
    assert_ne!(confirm.connection_id, bogus, "fresh connection id issued");
    assert_eq!(confirm.last_received, 0, "counters reset, no replay");

    relay.stop().await;
}
