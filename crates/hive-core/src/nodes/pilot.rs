use hive_proto::Message;
use hive_transport::{Channel, Line};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::registry::Registry;

/// Bridges a pilot connection to the actor of the vehicle they fly.
///
/// Only one pilot is attached per vehicle; a newer pilot replaces this one.
pub struct PilotNode {
    user_id: String,
    vehicle_id: String,
    channel: Arc<dyn Channel>,
    registry: Arc<Registry>,
    config: NodeConfig,
}

impl PilotNode {
    pub fn new(
        user_id: impl Into<String>,
        vehicle_id: impl Into<String>,
        channel: Arc<dyn Channel>,
        registry: Arc<Registry>,
        config: NodeConfig,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            vehicle_id: vehicle_id.into(),
            channel,
            registry,
            config,
        }
    }

    pub async fn run(self) {
        let line = Line::new(format!("user:{}", self.user_id), true, self.config.line);
        self.registry.get(&self.vehicle_id).connect_user(&line);
        info!(user_id = %self.user_id, vehicle_id = %self.vehicle_id, "pilot attached");

        let login = Message::update(
            "update:login",
            json!({ "id": self.user_id, "vehicleID": self.vehicle_id }),
        );
        if let Err(err) = self.channel.send(login).await {
            debug!(user_id = %self.user_id, error = %err, "login notice not delivered");
        }

        let channel_done = self.channel.done();
        let line_done = line.done();
        loop {
            tokio::select! {
                _ = channel_done.wait() => break,
                _ = line_done.wait() => {
                    self.channel.disconnect();
                    break;
                }
                Some(msg) = self.channel.recv() => {
                    if let Err(err) = line.send(msg).await {
                        debug!(user_id = %self.user_id, error = %err, "pilot message not delivered to actor");
                    }
                }
                Some(msg) = line.recv() => {
                    if let Err(err) = self.channel.send(msg).await {
                        debug!(user_id = %self.user_id, error = %err, "vehicle message not delivered to pilot");
                    }
                }
            }
        }

        line.disconnect();
        info!(user_id = %self.user_id, vehicle_id = %self.vehicle_id, "pilot detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TestHub;
    use hive_proto::models::Status;
    use hive_proto::Payload;
    use hive_transport::testing::MockChannel;
    use std::time::Duration;

    #[tokio::test]
    async fn relays_both_ways_until_hang_up() {
        let hub = TestHub::default();
        let (actor, vehicle) = hub.attach_vehicle("v1");
        let (channel, mut remote) = MockChannel::new("pilot");
        let run = tokio::spawn(PilotNode::new("alice", "v1", channel, hub.registry.clone(), NodeConfig::default()).run());

        let login = remote.next_sent().await.unwrap();
        assert_eq!(login.kind(), "update:login");
        assert_eq!(login.data().str_field("vehicleID"), Some("v1"));
        assert!(actor.user_connected());

        remote.inject(Message::update("takeoff", Payload::Empty));
        let cmd = tokio::time::timeout(Duration::from_secs(1), vehicle.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cmd.kind(), "takeoff");

        vehicle.send(Message::update("status", Status { armed: true })).await.unwrap();
        let status = remote.next_sent().await.unwrap();
        assert_eq!(status.kind(), "status");

        remote.hang_up();
        run.await.unwrap();
        assert!(!actor.user_connected());
    }
}
