//! Point-to-point relay scenarios over a real relay and real sockets.

use assert_matches::assert_matches;
use fairway_client::{ClientConfig, ClientError, VesselClient, VesselEvent};
use fairway_e2e_tests::RelayHarness;
use fairway_network::NetworkError;
use fairway_types::{Position, VesselId};
use std::time::Duration;

fn config(url: &str, id: &str) -> ClientConfig {
    let mut config = ClientConfig::new(url, id);
    config.position = Some(Position::new(0.0, 0.0));
    config.request_timeout = Duration::from_secs(5);
    config
}

#[tokio::test]
async fn invoke_round_trips_through_the_relay() {
    let relay = RelayHarness::start().await;

    let (alpha, _alpha_events) = VesselClient::connect(config(&relay.url(), "alpha"))
        .await
        .expect("alpha connects");
    let (bravo, mut bravo_events) = VesselClient::connect(config(&relay.url(), "bravo"))
        .await
        .expect("bravo connects");

    // Bravo answers every message it receives.
    let responder = tokio::spawn(async move {
        while let Some(event) = bravo_events.recv().await {
            if let VesselEvent::MessageReceived(message) = event {
                let payload = serde_json::json!({"echo": message.payload});
                bravo.reply_to(&message, payload).expect("bravo replies");
            }
        }
    });

    let reply = alpha
        .invoke(VesselId::new("bravo"), serde_json::json!({"text": "ahoy"}))
        .await
        .expect("invoke resolves");
    assert_eq!(reply.payload, serde_json::json!({"echo": {"text": "ahoy"}}));
    assert_eq!(reply.source, VesselId::new("bravo"));

    responder.abort();
    relay.stop().await;
}

#[tokio::test]
async fn relay_to_disconnected_target_is_dropped_without_side_effects() {
    let relay = RelayHarness::start().await;

    let (alpha, _events) = VesselClient::connect(config(&relay.url(), "alpha"))
        .await
        .expect("alpha connects");

    // The destination has never connected: the envelope is dropped, the
    // invoke times out, and nothing else on the connection is disturbed.
    let lost = alpha.invoke_with_timeout(
        VesselId::new("ghost"),
        serde_json::json!({"text": "anyone there?"}),
        Duration::from_millis(400),
    );
    // A concurrent request on the same connection keeps working.
    let lookup = alpha.find_service("pilotage", 0.0, 5);

    let (lost, lookup) = tokio::join!(lost, lookup);
    assert_matches!(
        lost,
        Err(ClientError::Network(NetworkError::Timeout { .. }))
    );
    assert_eq!(lookup.expect("lookup unaffected"), Vec::new());

    relay.stop().await;
}

#[tokio::test]
async fn request_timeout_fires_exactly_once() {
    let relay = RelayHarness::start().await;

    let (alpha, _alpha_events) = VesselClient::connect(config(&relay.url(), "alpha"))
        .await
        .expect("alpha connects");
    // Bravo is connected but its application never replies.
    let (_bravo, _bravo_events) = VesselClient::connect(config(&relay.url(), "bravo"))
        .await
        .expect("bravo connects");

    let started = tokio::time::Instant::now();
    let result = alpha
        .invoke_with_timeout(
            VesselId::new("bravo"),
            serde_json::json!({"text": "hello?"}),
            Duration::from_secs(1),
        )
        .await;
    let elapsed = started.elapsed();

    assert_matches!(
        result,
        Err(ClientError::Network(NetworkError::Timeout { timeout_ms: 1000 }))
    );
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(3), "timed out late: {elapsed:?}");

    relay.stop().await;
}
