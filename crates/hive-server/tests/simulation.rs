//! Integration tests for the hub with a simulated vehicle.

use std::time::Duration;

use hive_proto::models::Position;
use hive_server::{sim, Hub, HubConfig};

async fn eventually<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

/// Test: Simulated vehicle identifies and reports positions
#[tokio::test]
async fn integration_simulated_vehicle_reports() {
    let hub = Hub::build(HubConfig::default()).await.unwrap();
    let _sim = sim::spawn(&hub, "sim-1", Position::point(45.0, 7.0, 0.0));

    let telemetry = hub.telemetry().clone();
    assert!(eventually(|| {
        let telemetry = telemetry.clone();
        async move { matches!(telemetry.position("sim-1").await, Ok(Some(_))) }
    })
    .await);

    let info = telemetry.info("sim-1").await.unwrap().unwrap();
    assert_eq!(info.model, "simulated");
    assert!(telemetry.is_connected("sim-1").await.unwrap());
    assert_eq!(telemetry.connected_vehicles().await.unwrap(), vec!["sim-1".to_string()]);

    hub.shutdown();
}

/// Test: A goto through the actor is answered once the vehicle arrives
#[tokio::test]
async fn integration_simulated_goto() {
    let hub = Hub::build(HubConfig::default()).await.unwrap();
    let home = Position::point(45.0, 7.0, 10.0);
    let _sim = sim::spawn(&hub, "sim-2", home);

    let actor = hub.registry().get("sim-2");
    assert!(eventually(|| {
        let actor = actor.clone();
        async move { actor.vehicle_connected() }
    })
    .await);

    let target = home.translate(3.0, 0.0, 0.0);
    let reply = tokio::time::timeout(Duration::from_secs(5), actor.go_to(target))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply["reached"], true);

    hub.shutdown();
    assert!(actor.is_stopped());
}
