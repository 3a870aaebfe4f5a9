//! Integration tests for hub control flows.
//!
//! These tests drive control actors through their lines the way connection
//! handlers do, covering:
//! - Fence enforcement and recovery
//! - Rc override streaming
//! - Operator commands and actor lifecycle
//! - A vehicle connected over a wire channel

use std::sync::Arc;
use std::time::Duration;

use hive_core::harness::{command, next_except, TestHub};
use hive_core::{ActorConfig, NodeConfig, VehicleNode};
use hive_proto::models::{Position, Rc, EARTH_RADIUS_M};
use hive_proto::{Codec, Message, Payload};
use hive_transport::{Channel, WireChannel, WireConfig};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(1);

fn meters_to_deg(m: f64) -> f64 {
    (m / EARTH_RADIUS_M).to_degrees()
}

/// Test: Leaving the fence notifies the pilot once and sends one recovery goto
#[tokio::test(start_paused = true)]
async fn integration_fence_recovery() {
    let hub = TestHub::default();
    hub.set_fence((0.0, 0.0, 0.0), (10.0, 10.0, 10.0)).await.unwrap();
    let (actor, vehicle) = hub.attach_vehicle("v1");
    let (_, pilot) = hub.attach_pilot("v1");

    command(&actor, "fence:enable").await.unwrap();

    vehicle
        .send(Message::update("position", Position::point(5.0, 11.0, 5.0)))
        .await
        .unwrap();

    let state = next_except(&pilot, &[], WAIT).await.unwrap();
    assert_eq!(state.kind(), "fence_state");
    let state = state.data().as_fence_state().copied().unwrap();
    assert!(state.outside);
    assert!(!state.slowed);

    let relayed = next_except(&pilot, &[], WAIT).await.unwrap();
    assert_eq!(relayed.kind(), "position");
    assert!(relayed.data().as_position().unwrap().timestamp.is_some());

    let goto = next_except(&vehicle, &[], WAIT).await.unwrap();
    assert_eq!(goto.kind(), "goto");
    assert!(goto.is_request());
    let target = goto.data().as_position().copied().unwrap();
    let expected_lon = 10.0 - meters_to_deg(5.0) / 5.0f64.to_radians().cos();
    assert!((target.lon - expected_lon).abs() < 1e-9);
    assert_eq!(target.lat, 5.0);

    // Still outside while the goto is in flight: no new state, no new goto.
    vehicle
        .send(Message::update("position", Position::point(5.0, 11.0, 5.0)))
        .await
        .unwrap();
    let relayed = next_except(&pilot, &[], WAIT).await.unwrap();
    assert_eq!(relayed.kind(), "position");
    assert!(next_except(&vehicle, &[], Duration::from_millis(100)).await.is_none());

    goto.reply(Ok::<_, String>(json!(null))).unwrap();
}

/// Test: Recovery goes out even while the task pool is saturated
#[tokio::test(start_paused = true)]
async fn integration_fence_recovery_with_busy_pool() {
    let hub = TestHub::default();
    let _busy: Vec<_> = (0..hub.tasks.size())
        .map(|i| {
            hub.tasks
                .submit(format!("busy-{i}"), std::future::pending::<Result<(), String>>())
        })
        .collect();
    hub.set_fence((0.0, 0.0, 0.0), (10.0, 10.0, 10.0)).await.unwrap();
    let (actor, vehicle) = hub.attach_vehicle("v1");

    command(&actor, "fence:enable").await.unwrap();
    vehicle
        .send(Message::update("position", Position::point(5.0, 11.0, 5.0)))
        .await
        .unwrap();

    let goto = next_except(&vehicle, &[], WAIT).await.unwrap();
    assert_eq!(goto.kind(), "goto");
}

/// Test: Re-enabling the fence mid-recovery leaves a single recovery running
#[tokio::test(start_paused = true)]
async fn integration_fence_toggle_restarts_recovery() {
    let hub = TestHub::default();
    hub.set_fence((0.0, 0.0, 0.0), (10.0, 10.0, 10.0)).await.unwrap();
    let (actor, vehicle) = hub.attach_vehicle("v1");
    let outside = Position::point(5.0, 11.0, 5.0);

    command(&actor, "fence:enable").await.unwrap();
    vehicle.send(Message::update("position", outside)).await.unwrap();
    let first = next_except(&vehicle, &[], WAIT).await.unwrap();
    assert_eq!(first.kind(), "goto");

    command(&actor, "fence:disable").await.unwrap();
    command(&actor, "fence:enable").await.unwrap();
    vehicle.send(Message::update("position", outside)).await.unwrap();
    let second = next_except(&vehicle, &[], WAIT).await.unwrap();
    assert_eq!(second.kind(), "goto");

    vehicle.send(Message::update("position", outside)).await.unwrap();
    assert!(next_except(&vehicle, &[], Duration::from_millis(100)).await.is_none());
}

/// Test: Malformed telemetry from the vehicle never reaches the pilot
#[tokio::test(start_paused = true)]
async fn integration_malformed_telemetry_is_dropped() {
    let hub = TestHub::default();
    let (_, vehicle) = hub.attach_vehicle("v1");
    let (_, pilot) = hub.attach_pilot("v1");

    vehicle.send(Message::update("battery", json!("empty"))).await.unwrap();
    vehicle.send(Message::update("status", json!(42))).await.unwrap();
    vehicle
        .send(Message::update("position", Position::point(1.0, 2.0, 3.0)))
        .await
        .unwrap();

    let relayed = next_except(&pilot, &[], WAIT).await.unwrap();
    assert_eq!(relayed.kind(), "position");
    assert!(hub.telemetry.battery("v1").await.unwrap().is_none());
}

/// Test: Enabling the fence before one is configured fails
#[tokio::test]
async fn integration_fence_enable_without_fence() {
    let hub = TestHub::default();
    let (actor, _vehicle) = hub.attach_vehicle("v1");

    let err = command(&actor, "fence:enable").await.unwrap_err();
    assert_eq!(err.to_string(), "no fence configured");
}

/// Test: Override streams pilot input and ends with a neutral command
#[tokio::test(start_paused = true)]
async fn integration_rc_override() {
    let hub = TestHub::default();
    let (actor, vehicle) = hub.attach_vehicle("v1");
    let (_, pilot) = hub.attach_pilot("v1");

    command(&actor, "rc:override:start").await.unwrap();
    assert!(actor.is_overriding_rc());

    let manual = Rc::new(0.2, 0.1, 0.5, 0.0, 0.0).unwrap();
    pilot.send(Message::update("rc", manual)).await.unwrap();

    let streamed = next_except(&vehicle, &[], WAIT).await.unwrap();
    assert_eq!(streamed.kind(), "rc");
    assert!(streamed.data().as_rc().unwrap().same_axes(&manual));

    let stopped = command(&actor, "rc:override:stop").await.unwrap();
    assert_eq!(stopped, json!({ "wasActive": true }));

    let neutral = tokio::time::timeout(WAIT, async {
        loop {
            let msg = vehicle.recv().await.unwrap();
            if msg.data().as_rc().is_some_and(|rc| rc.same_axes(&Rc::zero())) {
                return msg;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(neutral.kind(), "rc");
    assert!(next_except(&vehicle, &[], Duration::from_millis(500)).await.is_none());
    assert!(!actor.is_overriding_rc());
}

/// Test: Override ends as soon as the vehicle connection closes
#[tokio::test(start_paused = true)]
async fn integration_rc_override_ends_with_vehicle() {
    let config = ActorConfig {
        rc_tick: Duration::from_secs(1),
        ..ActorConfig::default()
    };
    let hub = TestHub::new(config);
    let (actor, vehicle) = hub.attach_vehicle("v1");

    command(&actor, "rc:override:start").await.unwrap();
    assert!(actor.is_overriding_rc());

    let started = tokio::time::Instant::now();
    vehicle.close();
    while actor.is_overriding_rc() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(started.elapsed() < config.rc_tick);
}

/// Test: Override needs a connected vehicle
#[tokio::test]
async fn integration_rc_override_without_vehicle() {
    let hub = TestHub::default();
    let actor = hub.registry.get("lonely");

    let err = command(&actor, "rc:override:start").await.unwrap_err();
    assert_eq!(err.to_string(), "vehicle not connected");
    assert!(!actor.is_overriding_rc());
}

/// Test: Pilot rc is not relayed to the vehicle outside of override
#[tokio::test(start_paused = true)]
async fn integration_rc_without_override_is_held() {
    let hub = TestHub::default();
    let (_, vehicle) = hub.attach_vehicle("v1");
    let (_, pilot) = hub.attach_pilot("v1");

    pilot
        .send(Message::update("rc", Rc::new(1.0, 0.0, 0.0, 0.0, 0.0).unwrap()))
        .await
        .unwrap();
    pilot.send(Message::update("land", Payload::Empty)).await.unwrap();

    let relayed = next_except(&vehicle, &[], WAIT).await.unwrap();
    assert_eq!(relayed.kind(), "land");
}

/// Test: Stop closes the actor's connections and the registry replaces it
#[tokio::test]
async fn integration_stop_and_reap() {
    let hub = TestHub::default();
    let (actor, vehicle) = hub.attach_vehicle("v1");

    command(&actor, "stop").await.unwrap();
    tokio::time::timeout(WAIT, vehicle.done().wait()).await.unwrap();
    assert!(actor.is_stopped());
    assert!(!actor.vehicle_connected());

    assert_eq!(hub.registry.reap_stopped(), 1);
    assert!(hub.registry.is_empty());

    let replacement = hub.registry.get("v1");
    assert!(!Arc::ptr_eq(&actor, &replacement));
    assert!(!replacement.is_stopped());
}

/// Test: Unknown operator commands are answered with an error
#[tokio::test]
async fn integration_unknown_admin_command() {
    let hub = TestHub::default();
    let actor = hub.registry.get("v1");

    let err = command(&actor, "self-destruct").await.unwrap_err();
    assert_eq!(err.to_string(), "unknown command: self-destruct");
    assert!(!actor.is_stopped());
}

/// Test: A vehicle on a wire channel identifies and streams telemetry
#[tokio::test]
async fn integration_vehicle_over_wire() {
    let hub = TestHub::default();
    let (_, pilot) = hub.attach_pilot("v9");
    let (hub_side, vehicle_side) = WireChannel::pair(Codec::default(), WireConfig::default());

    let node = VehicleNode::new(
        "v9",
        Arc::new(hub_side),
        hub.registry.clone(),
        hub.telemetry.clone(),
        NodeConfig::default(),
    );
    let run = tokio::spawn(node.run());

    let info = vehicle_side.recv().await.unwrap();
    assert_eq!(info.kind(), "info");
    info.reply(Ok::<_, String>(json!({ "name": "wire", "model": "hex" })))
        .unwrap();

    vehicle_side
        .send(Message::update("position", Position::point(1.0, 2.0, 3.0)))
        .await
        .unwrap();
    let relayed = next_except(&pilot, &[], WAIT).await.unwrap();
    assert_eq!(relayed.kind(), "position");
    assert_eq!(relayed.data().as_position().unwrap().lon, 2.0);

    let stored = hub.telemetry.position("v9").await.unwrap().unwrap();
    assert_eq!(stored.lat, 1.0);
    assert_eq!(hub.telemetry.info("v9").await.unwrap().unwrap().model, "hex");

    drop(vehicle_side);
    tokio::time::timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    assert!(!hub.telemetry.is_connected("v9").await.unwrap());
}

/// Test: The configured goto timeout wins over the wire channel default
#[tokio::test(start_paused = true)]
async fn integration_goto_timeout_over_wire() {
    let config = ActorConfig {
        goto_timeout: Duration::from_secs(2),
        ..ActorConfig::default()
    };
    let hub = TestHub::new(config);
    let (hub_side, vehicle_side) = WireChannel::pair(Codec::default(), WireConfig::default());
    let node = VehicleNode::new(
        "v7",
        Arc::new(hub_side),
        hub.registry.clone(),
        hub.telemetry.clone(),
        NodeConfig::default(),
    );
    let run = tokio::spawn(node.run());

    let info = vehicle_side.recv().await.unwrap();
    info.reply(Ok::<_, String>(json!({ "name": "wire", "model": "hex" })))
        .unwrap();
    let actor = hub.registry.get("v7");
    while !actor.vehicle_connected() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let started = tokio::time::Instant::now();
    assert!(actor.go_to(Position::point(1.0, 2.0, 3.0)).await.is_err());
    assert!(started.elapsed() >= config.goto_timeout);
    assert!(started.elapsed() < WireConfig::default().callback_timeout);

    drop(vehicle_side);
    run.await.unwrap().unwrap();
}
