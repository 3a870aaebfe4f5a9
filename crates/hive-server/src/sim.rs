//! Simulated vehicle for running the hub without hardware.
//!
//! The model is a point mass: it flies straight to a `goto` target at a fixed
//! speed, otherwise integrates the last `rc` command, and reports its
//! position at 5 Hz over a [`WireChannel`].

use std::sync::Arc;
use std::time::Duration;

use hive_proto::models::{Position, Rc};
use hive_proto::{Codec, Message};
use hive_transport::{Channel, WireChannel};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::hub::Hub;

const REPORT_INTERVAL: Duration = Duration::from_millis(200);
/// Horizontal and vertical speed at full stick or toward a target.
const MAX_SPEED: f64 = 5.0;
/// Distance at which a target counts as reached.
const ARRIVAL_M: f64 = 0.5;
const TAKEOFF_ALT: f64 = 10.0;

/// Handles for a running simulation.
pub struct Simulation {
    pub node: JoinHandle<()>,
    pub vehicle: JoinHandle<()>,
}

/// Attach a simulated vehicle `vehicle_id` starting at `home`.
pub fn spawn(hub: &Hub, vehicle_id: &str, home: Position) -> Simulation {
    let (hub_side, vehicle_side) = WireChannel::pair(Codec::default(), hub.config().wire_config());

    let node = hub.vehicle_node(vehicle_id, Arc::new(hub_side));
    let id = vehicle_id.to_string();
    let node = tokio::spawn(async move {
        if let Err(err) = node.run().await {
            warn!(vehicle_id = %id, error = %err, "simulated vehicle rejected");
        }
    });

    let model = SimVehicle::new(vehicle_id, home);
    let vehicle = tokio::spawn(model.run(vehicle_side));
    info!(vehicle_id, lat = home.lat, lon = home.lon, "simulated vehicle started");
    Simulation { node, vehicle }
}

struct SimVehicle {
    id: String,
    home: Position,
    position: Position,
    rc: Rc,
    target: Option<Position>,
    pending_goto: Option<Message>,
}

impl SimVehicle {
    fn new(id: &str, home: Position) -> Self {
        Self {
            id: id.to_string(),
            home,
            position: home,
            rc: Rc::zero(),
            target: None,
            pending_goto: None,
        }
    }

    async fn run(mut self, channel: WireChannel) {
        let done = channel.done();
        let mut report = tokio::time::interval_at(Instant::now() + REPORT_INTERVAL, REPORT_INTERVAL);
        report.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = done.wait() => break,
                msg = channel.recv() => match msg {
                    Some(msg) => self.on_command(msg),
                    None => break,
                },
                _ = report.tick() => {
                    self.step(REPORT_INTERVAL.as_secs_f64());
                    let sample = Message::update("position", self.position);
                    if let Err(err) = channel.send(sample).await {
                        debug!(vehicle_id = %self.id, error = %err, "position not sent");
                    }
                }
            }
        }
        debug!(vehicle_id = %self.id, "simulated vehicle stopped");
    }

    fn on_command(&mut self, msg: Message) {
        let result: Result<Value, String> = match msg.kind() {
            "info" => Ok(json!({ "name": format!("sim-{}", self.id), "model": "simulated" })),
            "goto" => match msg.data().as_position() {
                Some(target) => {
                    self.fly_to(*target);
                    if let Some(old) = self.pending_goto.replace(msg) {
                        let _ = old.reply(Err::<Value, _>("superseded"));
                    }
                    return;
                }
                None => Err("bad goto data format".to_string()),
            },
            "rc" => {
                match msg.data().as_rc() {
                    // Ignored while flying to a target.
                    Some(rc) => self.rc = *rc,
                    None => debug!(vehicle_id = %self.id, "ignoring rc without rc data"),
                }
                Ok(Value::Null)
            }
            "takeoff" => {
                self.fly_to(Position {
                    rel_alt: TAKEOFF_ALT,
                    ..self.position
                });
                Ok(Value::Null)
            }
            "land" => {
                self.fly_to(Position {
                    rel_alt: 0.0,
                    ..self.position
                });
                Ok(Value::Null)
            }
            "rtl" => {
                self.fly_to(Position {
                    rel_alt: self.position.rel_alt,
                    ..self.home
                });
                Ok(Value::Null)
            }
            other => Err(format!("unsupported command {other}")),
        };
        if msg.is_request() {
            let _ = msg.reply(result);
        }
    }

    fn fly_to(&mut self, target: Position) {
        self.target = Some(target);
        self.rc = Rc::zero();
    }

    /// Advance the model by `dt` seconds.
    fn step(&mut self, dt: f64) {
        let reach = MAX_SPEED * dt;
        let (dx, dy, dz) = match self.target {
            Some(target) => {
                let (x, y, z) = self.position.meter_offset(&target);
                let dist = (x * x + y * y + z * z).sqrt();
                if dist <= reach.max(ARRIVAL_M) {
                    self.arrive(target);
                    (0.0, 0.0, 0.0)
                } else {
                    let scale = reach / dist;
                    (x * scale, y * scale, z * scale)
                }
            }
            None => (self.rc.roll * reach, self.rc.pitch * reach, self.rc.throttle * reach),
        };

        let moved = self.position.translate(dx, dy, dz);
        self.position = Position {
            rel_alt: moved.rel_alt.max(0.0),
            vx: dx / dt,
            vy: dy / dt,
            vz: dz / dt,
            ..moved
        };
    }

    fn arrive(&mut self, target: Position) {
        self.position = Position {
            lat: target.lat,
            lon: target.lon,
            rel_alt: target.rel_alt,
            ..self.position
        };
        self.target = None;
        if let Some(goto) = self.pending_goto.take() {
            let _ = goto.reply(Ok::<_, String>(json!({ "reached": true })));
        }
    }
}
