use hive_proto::models::FencePoints;
use hive_proto::{Callback, Message, Payload, ReplyEnvelope};
use hive_transport::Channel;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::errors::CoreError;
use crate::fence_slot::FenceSlot;
use crate::registry::Registry;
use crate::tasks::TaskPool;
use crate::telemetry::Telemetry;

/// Data key naming the vehicle a command targets.
pub const VEHICLE_KEY: &str = "vehicleID";

/// Commands relayed verbatim to a vehicle's control actor.
const ACTOR_COMMANDS: &[&str] = &[
    "fence:enable",
    "fence:disable",
    "rc:override:start",
    "rc:override:stop",
    "stop",
];

/// Serves one operator connection.
///
/// Every command runs on the shared [`TaskPool`] and is answered with a
/// `reply`; the operator also receives the connected vehicle list whenever
/// it changes.
pub struct DispatcherNode {
    channel: Arc<dyn Channel>,
    commands: Commands,
    tasks: TaskPool,
}

#[derive(Clone)]
struct Commands {
    registry: Arc<Registry>,
    fence: FenceSlot,
    telemetry: Telemetry,
    timeout: Duration,
}

impl DispatcherNode {
    pub fn new(
        channel: Arc<dyn Channel>,
        registry: Arc<Registry>,
        fence: FenceSlot,
        telemetry: Telemetry,
        tasks: TaskPool,
        config: NodeConfig,
    ) -> Self {
        Self {
            channel,
            tasks,
            commands: Commands {
                registry,
                fence,
                telemetry,
                timeout: config.command_timeout,
            },
        }
    }

    pub async fn run(self) {
        let mut events = self.commands.telemetry.subscribe();
        let done = self.channel.done();
        info!(channel = self.channel.name(), "dispatcher attached");
        self.send_vehicles().await;

        loop {
            tokio::select! {
                _ = done.wait() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        debug!(?event, "vehicle list changed");
                        self.send_vehicles().await;
                    }
                    None => break,
                },
                msg = self.channel.recv() => match msg {
                    Some(msg) => self.dispatch(msg),
                    None => break,
                },
            }
        }

        self.commands.telemetry.unsubscribe(&events);
        info!(channel = self.channel.name(), "dispatcher detached");
    }

    async fn send_vehicles(&self) {
        let vehicles = match self.commands.telemetry.connected_vehicles().await {
            Ok(vehicles) => vehicles,
            Err(err) => {
                warn!(error = %err, "vehicle list unavailable");
                return;
            }
        };
        if let Err(err) = self.channel.send(Message::update("vehicles", json!(vehicles))).await {
            debug!(error = %err, "vehicle list not delivered");
        }
    }

    fn dispatch(&self, msg: Message) {
        let commands = self.commands.clone();
        let channel = self.channel.clone();
        let name = format!("command:{}", msg.kind());
        self.tasks.submit(name, async move {
            let outcome = commands.execute(&msg).await;
            if let Err(err) = &outcome {
                debug!(command = msg.kind(), error = %err, "command failed");
            }
            answer(channel.as_ref(), &msg, outcome).await
        });
    }
}

impl Commands {
    async fn execute(&self, msg: &Message) -> Result<Value, CoreError> {
        match msg.kind() {
            "fence:set" => {
                let points = fence_points(msg.data())?;
                let fence = self.fence.set(&points).await?;
                info!(min = ?fence.min(), max = ?fence.max(), "fence replaced");
                Ok(serde_json::to_value(fence.to_points()).unwrap_or(Value::Null))
            }
            "vehicles" => Ok(json!(self.telemetry.connected_vehicles().await?)),
            kind if ACTOR_COMMANDS.contains(&kind) => {
                let vehicle_id = msg
                    .data()
                    .str_field(VEHICLE_KEY)
                    .ok_or(CoreError::MissingField(VEHICLE_KEY))?;
                self.forward(vehicle_id, kind).await
            }
            other => Err(CoreError::UnknownCommand(other.to_string())),
        }
    }

    async fn forward(&self, vehicle_id: &str, kind: &str) -> Result<Value, CoreError> {
        let actor = match (kind, self.registry.peek(vehicle_id)) {
            ("stop", None) => return Ok(Value::Null),
            ("stop", Some(actor)) => actor,
            _ => self.registry.get(vehicle_id),
        };
        let callback = Callback::new();
        actor
            .push(Message::request(kind, Payload::Empty, Some(callback.clone())))
            .await?;
        callback.timeout(self.timeout);
        Ok(callback.wait().await?)
    }
}

fn fence_points(data: &Payload) -> Result<FencePoints, CoreError> {
    let bad = || CoreError::BadPayload {
        kind: "fence:set".to_string(),
    };
    match data {
        Payload::Fence(points) => Ok(points.clone()),
        Payload::Json(value) => serde_json::from_value(value.clone()).map_err(|_| bad()),
        _ => Err(bad()),
    }
}

/// Answer through the request's callback, or with a `reply` update when
/// the operator sent a plain update.
async fn answer(channel: &dyn Channel, msg: &Message, outcome: Result<Value, CoreError>) -> Result<(), CoreError> {
    if msg.is_request() {
        msg.reply(outcome)?;
        return Ok(());
    }
    let envelope = match outcome {
        Ok(result) => ReplyEnvelope {
            id: msg.id().to_string(),
            result: Some(result),
            error: None,
        },
        Err(err) => ReplyEnvelope {
            id: msg.id().to_string(),
            result: None,
            error: Some(err.to_string()),
        },
    };
    channel.send(Message::update("reply", envelope)).await?;
    Ok(())
}
