//! Broadcast fan-out by geodesic proximity.

use fairway_client::{ClientConfig, VesselClient, VesselEvent};
use fairway_e2e_tests::RelayHarness;
use fairway_types::Position;
use std::time::Duration;

fn config_at(url: &str, id: &str, lat: f64, lon: f64) -> ClientConfig {
    let mut config = ClientConfig::new(url, id);
    config.position = Some(Position::new(lat, lon));
    config.request_timeout = Duration::from_secs(5);
    config
}

async fn next_broadcast(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<VesselEvent>,
    deadline: Duration,
) -> Option<(String, serde_json::Value)> {
    let read = async {
        while let Some(event) = events.recv().await {
            if let VesselEvent::BroadcastReceived { source, payload, .. } = event {
                return Some((source.as_str().to_string(), payload));
            }
        }
        None
    };
    tokio::time::timeout(deadline, read).await.ok().flatten()
}

#[tokio::test]
async fn only_vessels_inside_the_threshold_receive_the_broadcast() {
    let relay = RelayHarness::start().await;

    // Sender at the origin, one vessel ~111 m away, one across the globe.
    let (sender, _sender_events) =
        VesselClient::connect(config_at(&relay.url(), "sender", 0.0, 0.0))
            .await
            .expect("sender connects");
    let (_near, mut near_events) =
        VesselClient::connect(config_at(&relay.url(), "near", 0.001, 0.0))
            .await
            .expect("near connects");
    let (_far, mut far_events) = VesselClient::connect(config_at(&relay.url(), "far", 10.0, 10.0))
        .await
        .expect("far connects");

    let broadcast_seq = sender
        .broadcast(serde_json::json!({"warning": "ice"}), 200.0, false)
        .await
        .expect("send-ack arrives even before any delivery is known");
    assert!(broadcast_seq > 0);

    let delivered = next_broadcast(&mut near_events, Duration::from_secs(2))
        .await
        .expect("near vessel receives the broadcast");
    assert_eq!(delivered.0, "sender");
    assert_eq!(delivered.1, serde_json::json!({"warning": "ice"}));

    assert!(
        next_broadcast(&mut far_events, Duration::from_millis(300))
            .await
            .is_none(),
        "far vessel must not receive the broadcast"
    );

    relay.stop().await;
}

#[tokio::test]
async fn receiver_acks_are_relayed_back_to_the_sender() {
    let relay = RelayHarness::start().await;

    let (sender, mut sender_events) =
        VesselClient::connect(config_at(&relay.url(), "sender", 0.0, 0.0))
            .await
            .expect("sender connects");
    let (_near, _near_events) =
        VesselClient::connect(config_at(&relay.url(), "near", 0.0005, 0.0))
            .await
            .expect("near connects");

    let broadcast_seq = sender
        .broadcast(serde_json::json!({"ping": true}), 500.0, true)
        .await
        .expect("broadcast acked");

    let ack = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(event) = sender_events.recv().await {
            if let VesselEvent::BroadcastAckReceived {
                broadcast_seq,
                receiver,
                ..
            } = event
            {
                return Some((broadcast_seq, receiver));
            }
        }
        None
    })
    .await
    .expect("ack before timeout")
    .expect("ack event");

    assert_eq!(ack.0, broadcast_seq);
    assert_eq!(ack.1.as_str(), "near");

    relay.stop().await;
}
