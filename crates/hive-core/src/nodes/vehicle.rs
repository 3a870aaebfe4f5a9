use hive_proto::models::VehicleInfo;
use hive_proto::{Callback, Message, Payload};
use hive_transport::{Channel, Line};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::errors::CoreError;
use crate::registry::Registry;
use crate::telemetry::Telemetry;

/// Bridges a vehicle connection to its control actor.
pub struct VehicleNode {
    vehicle_id: String,
    channel: Arc<dyn Channel>,
    registry: Arc<Registry>,
    telemetry: Telemetry,
    config: NodeConfig,
}

impl VehicleNode {
    pub fn new(
        vehicle_id: impl Into<String>,
        channel: Arc<dyn Channel>,
        registry: Arc<Registry>,
        telemetry: Telemetry,
        config: NodeConfig,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            channel,
            registry,
            telemetry,
            config,
        }
    }

    /// Identify the vehicle, attach it, and relay until the connection ends.
    pub async fn run(self) -> Result<(), CoreError> {
        let info = match self.fetch_info().await {
            Ok(info) => info,
            Err(err) => {
                warn!(vehicle_id = %self.vehicle_id, error = %err, "vehicle did not identify, dropping connection");
                self.channel.disconnect();
                return Err(err);
            }
        };
        if let Err(err) = self.telemetry.save_info(&info).await {
            warn!(vehicle_id = %self.vehicle_id, error = %err, "vehicle record not saved");
        }

        let line = Line::new(format!("vehicle:{}", self.vehicle_id), true, self.config.line);
        let actor = self.registry.get(&self.vehicle_id);
        actor.connect_vehicle(&line);
        info!(vehicle_id = %self.vehicle_id, name = %info.name, model = %info.model, "vehicle attached");
        if let Err(err) = self.telemetry.mark_connected(&self.vehicle_id).await {
            warn!(vehicle_id = %self.vehicle_id, error = %err, "connection marker not stored");
        }

        self.relay(&line).await;

        line.disconnect();
        if let Err(err) = self.telemetry.mark_disconnected(&self.vehicle_id).await {
            warn!(vehicle_id = %self.vehicle_id, error = %err, "connection marker not cleared");
        }
        Ok(())
    }

    async fn fetch_info(&self) -> Result<VehicleInfo, CoreError> {
        let callback = Callback::new();
        self.channel
            .send(Message::request("info", Payload::Empty, Some(callback.clone())))
            .await?;
        callback.timeout(self.config.info_timeout);
        let value = callback.wait().await?;
        let mut info: VehicleInfo = serde_json::from_value(value).map_err(CoreError::BadVehicleInfo)?;
        info.id = self.vehicle_id.clone();
        Ok(info)
    }

    async fn relay(&self, line: &Line) {
        let channel_done = self.channel.done();
        let line_done = line.done();
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.config.heartbeat,
            self.config.heartbeat,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = channel_done.wait() => break,
                _ = line_done.wait() => {
                    debug!(vehicle_id = %self.vehicle_id, "replaced by another connection");
                    self.channel.disconnect();
                    break;
                }
                Some(msg) = self.channel.recv() => {
                    if let Err(err) = line.send(msg).await {
                        debug!(vehicle_id = %self.vehicle_id, error = %err, "vehicle message not delivered to actor");
                    }
                }
                Some(msg) = line.recv() => {
                    if let Err(err) = self.channel.send(msg).await {
                        debug!(vehicle_id = %self.vehicle_id, error = %err, "command not delivered to vehicle");
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(err) = self.telemetry.heartbeat(&self.vehicle_id).await {
                        warn!(vehicle_id = %self.vehicle_id, error = %err, "heartbeat not stored");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TestHub;
    use hive_proto::models::Battery;
    use hive_transport::testing::MockChannel;
    use serde_json::{json, Value};
    use std::time::Duration;

    #[tokio::test]
    async fn identifies_then_relays_to_the_pilot() {
        let hub = TestHub::default();
        let (_, pilot) = hub.attach_pilot("v1");
        let (channel, mut remote) = MockChannel::new("vehicle");
        let node = VehicleNode::new("v1", channel, hub.registry.clone(), hub.telemetry.clone(), NodeConfig::default());
        let run = tokio::spawn(node.run());

        let info = remote.next_sent().await.unwrap();
        assert_eq!(info.kind(), "info");
        assert!(info.is_request());
        info.reply(Ok::<_, CoreError>(json!({ "id": "spoofed", "name": "Alpha", "model": "quad" })))
            .unwrap();

        let battery = Battery {
            voltage: 12.4,
            current: 3.0,
            percent: 80.0,
        };
        remote.inject(Message::update("battery", battery));
        let relayed = tokio::time::timeout(Duration::from_secs(1), pilot.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relayed.kind(), "battery");

        let saved = hub.telemetry.info("v1").await.unwrap().unwrap();
        assert_eq!(saved.id, "v1");
        assert_eq!(saved.name, "Alpha");
        assert!(hub.telemetry.is_connected("v1").await.unwrap());
        assert_eq!(hub.telemetry.battery("v1").await.unwrap(), Some(battery));

        remote.hang_up();
        run.await.unwrap().unwrap();
        assert!(!hub.telemetry.is_connected("v1").await.unwrap());
    }

    #[tokio::test]
    async fn failed_identification_drops_the_connection() {
        let hub = TestHub::default();
        let (channel, mut remote) = MockChannel::new("vehicle");
        let node = VehicleNode::new("v2", channel, hub.registry.clone(), hub.telemetry.clone(), NodeConfig::default());
        let run = tokio::spawn(node.run());

        let info = remote.next_sent().await.unwrap();
        info.reply(Err::<Value, _>("no autopilot")).unwrap();

        let err = run.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "no autopilot");
        assert!(remote.is_done());
        assert!(hub.registry.peek("v2").is_none());
    }

    #[tokio::test]
    async fn a_newer_connection_replaces_the_old_one() {
        let hub = TestHub::default();
        let (first, mut first_remote) = MockChannel::new("vehicle-1");
        let run = tokio::spawn(
            VehicleNode::new("v3", first, hub.registry.clone(), hub.telemetry.clone(), NodeConfig::default()).run(),
        );
        first_remote
            .next_sent()
            .await
            .unwrap()
            .reply(Ok::<_, CoreError>(json!({})))
            .unwrap();
        while !hub.registry.get("v3").vehicle_connected() {
            tokio::task::yield_now().await;
        }

        let replacement = Line::new("vehicle:v3:new", true, Default::default());
        hub.registry.get("v3").connect_vehicle(&replacement);

        run.await.unwrap().unwrap();
        assert!(first_remote.is_done());
    }
}
