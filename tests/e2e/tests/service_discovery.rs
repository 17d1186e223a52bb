//! Proximity-based service discovery.

use fairway_client::{ClientConfig, VesselClient};
use fairway_e2e_tests::RelayHarness;
use fairway_types::Position;
use std::time::Duration;

/// Degrees of latitude per meter at the equator on the spherical model.
fn lat_for_meters(meters: f64) -> f64 {
    meters / 111_194.9
}

fn config_at(url: &str, id: &str, lat: f64) -> ClientConfig {
    let mut config = ClientConfig::new(url, id);
    config.position = Some(Position::new(lat, 0.0));
    config.request_timeout = Duration::from_secs(5);
    config
}

#[tokio::test]
async fn find_service_returns_nearest_matches_within_range() {
    let relay = RelayHarness::start().await;

    let (requester, _events) = VesselClient::connect(config_at(&relay.url(), "requester", 0.0))
        .await
        .expect("requester connects");

    // Three providers at 10 m, 50 m and 500 m.
    let mut providers = Vec::new();
    for (id, meters) in [("p-10", 10.0), ("p-50", 50.0), ("p-500", 500.0)] {
        let (provider, _provider_events) =
            VesselClient::connect(config_at(&relay.url(), id, lat_for_meters(meters)))
                .await
                .expect("provider connects");
        provider
            .register_service("weather")
            .await
            .expect("service registered");
        providers.push(provider);
    }

    // The proximity snapshot is eventually consistent; give the test relay
    // (50 ms rebuild period) a couple of cycles.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let matches = requester
        .find_service("weather", 100.0, 2)
        .await
        .expect("lookup resolves");

    let ids: Vec<&str> = matches.iter().map(|m| m.vessel_id.as_str()).collect();
    assert_eq!(ids, vec!["p-10", "p-50"], "nearest first, 500 m filtered out");
    assert!((matches[0].distance_m - 10.0).abs() < 1.0);
    assert!((matches[1].distance_m - 50.0).abs() < 1.0);

    // An unknown service name finds nothing.
    let none = requester
        .find_service("icebreaking", 0.0, 10)
        .await
        .expect("lookup resolves");
    assert!(none.is_empty());

    relay.stop().await;
}

#[tokio::test]
async fn registration_is_idempotent_and_survives_repeat_calls() {
    let relay = RelayHarness::start().await;

    let (requester, _events) = VesselClient::connect(config_at(&relay.url(), "requester", 0.0))
        .await
        .expect("requester connects");
    let (provider, _provider_events) =
        VesselClient::connect(config_at(&relay.url(), "provider", lat_for_meters(20.0)))
            .await
            .expect("provider connects");

    provider.register_service("pilotage").await.expect("first");
    provider.register_service("pilotage").await.expect("again");

    tokio::time::sleep(Duration::from_millis(300)).await;

    let matches = requester
        .find_service("pilotage", 0.0, 10)
        .await
        .expect("lookup resolves");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].vessel_id.as_str(), "provider");

    relay.stop().await;
}
