//! Per-vehicle control actor.
//!
//! Each vehicle gets one actor owning three lines: one toward the vehicle
//! connection, one toward the current pilot, and an inbox for operator
//! commands. A single task serializes everything the actor does: telemetry
//! bookkeeping, fence evaluation, relaying between vehicle and pilot, and
//! emitting rc commands while override is active.

use hive_proto::models::{Position, Rc};
use hive_proto::{Callback, Message, Payload};
use hive_transport::{DoneSignal, Line, TransportError};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::ActorConfig;
use crate::errors::CoreError;
use crate::fence_handler::FenceHandler;
use crate::fence_slot::FenceSlot;
use crate::rc::RcArbiter;
use crate::telemetry::Telemetry;

// ============================================================================
// Shared dependencies
// ============================================================================

/// Everything an actor needs from the rest of the hub.
#[derive(Clone)]
pub struct ActorContext {
    pub telemetry: Telemetry,
    pub fence: FenceSlot,
    pub config: ActorConfig,
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    vehicle_messages: AtomicU64,
    user_messages: AtomicU64,
    admin_commands: AtomicU64,
    rc_commands: AtomicU64,
}

/// Snapshot of actor activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActorStats {
    pub vehicle_messages: u64,
    pub user_messages: u64,
    pub admin_commands: u64,
    pub rc_commands: u64,
}

// ============================================================================
// Actor handle
// ============================================================================

pub struct ControlActor {
    vehicle_id: String,
    vehicle: Line,
    user: Line,
    admin: Line,
    done: DoneSignal,
    overriding_rc: AtomicBool,
    override_generation: AtomicU64,
    rc_ticks: mpsc::Sender<()>,
    config: ActorConfig,
    counters: Counters,
}

impl fmt::Debug for ControlActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlActor")
            .field("vehicle_id", &self.vehicle_id)
            .field("vehicle_connected", &self.vehicle.is_connected())
            .field("user_connected", &self.user.is_connected())
            .field("overriding_rc", &self.is_overriding_rc())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl ControlActor {
    /// Create the actor and start its loop.
    pub fn spawn(vehicle_id: impl Into<String>, ctx: ActorContext) -> Arc<Self> {
        let vehicle_id = vehicle_id.into();
        let (rc_ticks, ticks) = mpsc::channel(1);
        let line = |side: &str| Line::new(format!("actor:{vehicle_id}:{side}"), false, ctx.config.line);
        let actor = Arc::new(Self {
            vehicle: line("vehicle"),
            user: line("user"),
            admin: line("admin"),
            vehicle_id,
            done: DoneSignal::new(),
            overriding_rc: AtomicBool::new(false),
            override_generation: AtomicU64::new(0),
            rc_ticks,
            config: ctx.config,
            counters: Counters::default(),
        });

        let worker = ActorLoop {
            actor: actor.clone(),
            rc: RcArbiter::new(ctx.config.rc_failsafe),
            fence: None,
            ctx,
        };
        tokio::spawn(worker.run(ticks));
        actor
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    /// Attach a vehicle connection, replacing any previous one.
    pub fn connect_vehicle(&self, line: &Line) {
        self.vehicle.connect(line);
    }

    /// Attach a pilot connection, replacing any previous one.
    pub fn connect_user(&self, line: &Line) {
        self.user.connect(line);
    }

    pub fn vehicle_connected(&self) -> bool {
        self.vehicle.is_connected()
    }

    pub fn user_connected(&self) -> bool {
        self.user.is_connected()
    }

    /// Queue an operator command.
    pub async fn push(&self, msg: Message) -> Result<(), TransportError> {
        self.admin.push(msg).await
    }

    /// Ask the loop to terminate. Returns false if already stopping.
    pub fn stop(&self) -> bool {
        self.done.fire()
    }

    pub fn is_stopped(&self) -> bool {
        self.done.is_done()
    }

    pub fn done(&self) -> DoneSignal {
        self.done.clone()
    }

    pub fn is_overriding_rc(&self) -> bool {
        self.overriding_rc.load(Ordering::SeqCst)
    }

    /// Start streaming arbitrated rc commands to the vehicle every tick.
    pub fn start_rc_override(self: &Arc<Self>) -> Result<(), CoreError> {
        if !self.vehicle.is_connected() {
            return Err(CoreError::VehicleNotConnected);
        }
        if self.overriding_rc.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let generation = self.override_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(vehicle_id = %self.vehicle_id, "rc override started");
        tokio::spawn(Arc::clone(self).run_rc_override(generation));
        Ok(())
    }

    /// Stop streaming; a neutral command follows on the next tick. Returns
    /// whether override was active.
    pub fn stop_rc_override(&self) -> bool {
        let was_active = self.overriding_rc.swap(false, Ordering::SeqCst);
        if was_active {
            info!(vehicle_id = %self.vehicle_id, "rc override stopped");
        }
        was_active
    }

    /// Send the vehicle to `target` and wait for its acknowledgement.
    pub async fn go_to(&self, target: Position) -> Result<Value, CoreError> {
        go_to(&self.vehicle, target, self.config.goto_timeout).await
    }

    pub fn stats(&self) -> ActorStats {
        ActorStats {
            vehicle_messages: self.counters.vehicle_messages.load(Ordering::Relaxed),
            user_messages: self.counters.user_messages.load(Ordering::Relaxed),
            admin_commands: self.counters.admin_commands.load(Ordering::Relaxed),
            rc_commands: self.counters.rc_commands.load(Ordering::Relaxed),
        }
    }

    fn override_current(&self, generation: u64) -> bool {
        self.override_generation.load(Ordering::SeqCst) == generation
    }

    async fn run_rc_override(self: Arc<Self>, generation: u64) {
        let tick = self.config.rc_tick;
        let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let vehicle = self.vehicle.peer();
        let vehicle_gone = async {
            match &vehicle {
                Some(peer) => peer.done().wait().await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(vehicle_gone);

        loop {
            tokio::select! {
                _ = self.done.wait() => break,
                _ = &mut vehicle_gone => {
                    debug!(vehicle_id = %self.vehicle_id, "vehicle closed, ending rc override");
                    break;
                }
                _ = interval.tick() => {
                    if !self.is_overriding_rc() || !self.override_current(generation) {
                        break;
                    }
                    if !self.vehicle.is_connected() {
                        debug!(vehicle_id = %self.vehicle_id, "vehicle gone, ending rc override");
                        break;
                    }
                    // A full queue means the loop still has a tick pending.
                    let _ = self.rc_ticks.try_send(());
                }
            }
        }

        if self.override_current(generation) {
            self.overriding_rc.store(false, Ordering::SeqCst);
            if let Err(err) = self.vehicle.send(Message::update("rc", Rc::zero())).await {
                debug!(vehicle_id = %self.vehicle_id, error = %err, "neutral rc not delivered");
            }
        }
    }
}

/// Send `goto` to whatever `vehicle` is connected to and wait for the reply.
pub async fn go_to(vehicle: &Line, target: Position, timeout: Duration) -> Result<Value, CoreError> {
    if !vehicle.is_connected() {
        return Err(CoreError::VehicleNotConnected);
    }
    let callback = Callback::new();
    // Before send: the first timeout armed wins.
    callback.timeout(timeout);
    vehicle
        .send(Message::request("goto", target, Some(callback.clone())))
        .await?;
    Ok(callback.wait().await?)
}

// ============================================================================
// Actor loop
// ============================================================================

struct ActorLoop {
    actor: Arc<ControlActor>,
    rc: RcArbiter,
    fence: Option<FenceHandler>,
    ctx: ActorContext,
}

impl ActorLoop {
    async fn run(mut self, mut ticks: mpsc::Receiver<()>) {
        let actor = self.actor.clone();
        info!(vehicle_id = %actor.vehicle_id, "control actor started");

        loop {
            tokio::select! {
                _ = actor.done.wait() => break,
                Some(msg) = actor.admin.recv() => self.on_admin(msg).await,
                Some(msg) = actor.vehicle.recv() => self.on_vehicle(msg).await,
                Some(msg) = actor.user.recv() => self.on_user(msg).await,
                Some(()) = ticks.recv() => self.on_rc_tick().await,
            }
        }

        self.shut_down();
    }

    async fn on_vehicle(&mut self, mut msg: Message) {
        self.actor.counters.vehicle_messages.fetch_add(1, Ordering::Relaxed);
        let vehicle_id = self.actor.vehicle_id.as_str();
        let telemetry = &self.ctx.telemetry;

        match msg.kind() {
            "position" => {
                let Some(pos) = msg.data().as_position().copied() else {
                    warn!(vehicle_id, "dropping position without position data");
                    return;
                };
                let pos = pos.stamped();
                if let Err(err) = telemetry.set_position(vehicle_id, &pos).await {
                    warn!(vehicle_id, error = %err, "position not stored");
                }
                if let Some(handler) = self.fence.as_mut() {
                    handler.check(&pos, &mut self.rc).await;
                }
                msg.replace_data(pos);
            }
            "battery" => match msg.data() {
                Payload::Battery(battery) => {
                    if let Err(err) = telemetry.set_battery(vehicle_id, battery).await {
                        warn!(vehicle_id, error = %err, "battery not stored");
                    }
                }
                _ => {
                    warn!(vehicle_id, "dropping battery without battery data");
                    return;
                }
            },
            "status" => match msg.data() {
                Payload::Status(status) => {
                    if let Err(err) = telemetry.set_status(vehicle_id, status).await {
                        warn!(vehicle_id, error = %err, "status not stored");
                    }
                }
                _ => {
                    warn!(vehicle_id, "dropping status without status data");
                    return;
                }
            },
            _ => {}
        }

        if let Err(err) = self.actor.user.send(msg).await {
            trace!(vehicle_id, error = %err, "vehicle message not relayed to pilot");
        }
    }

    async fn on_user(&mut self, msg: Message) {
        self.actor.counters.user_messages.fetch_add(1, Ordering::Relaxed);
        let vehicle_id = self.actor.vehicle_id.as_str();

        if msg.kind() == "rc" {
            match msg.data().as_rc() {
                Some(rc) => match rc.validate() {
                    Ok(()) => self.rc.set_manual(*rc),
                    Err(err) => warn!(vehicle_id, error = %err, "dropping out-of-range rc"),
                },
                None => warn!(vehicle_id, "dropping rc without rc data"),
            }
            return;
        }

        if let Err(err) = self.actor.vehicle.send(msg).await {
            debug!(vehicle_id, error = %err, "pilot message not relayed to vehicle");
        }
    }

    async fn on_admin(&mut self, msg: Message) {
        self.actor.counters.admin_commands.fetch_add(1, Ordering::Relaxed);
        let vehicle_id = self.actor.vehicle_id.clone();

        let outcome: Result<Value, CoreError> = match msg.kind() {
            "fence:enable" => self.enable_fence().map(|_| Value::Null),
            "fence:disable" => {
                self.disable_fence();
                Ok(Value::Null)
            }
            "rc:override:start" => self.actor.start_rc_override().map(|_| Value::Null),
            "rc:override:stop" => Ok(json!({ "wasActive": self.actor.stop_rc_override() })),
            "stop" => {
                self.actor.stop();
                Ok(Value::Null)
            }
            // Otherwise ignored; requests still get an error so they settle.
            other => {
                debug!(vehicle_id = %vehicle_id, kind = other, "ignoring unknown admin command");
                Err(CoreError::UnknownCommand(other.to_string()))
            }
        };

        if let Err(err) = &outcome {
            debug!(vehicle_id = %vehicle_id, command = msg.kind(), error = %err, "admin command failed");
        }
        if msg.is_request() {
            let _ = msg.reply(outcome);
        }
    }

    async fn on_rc_tick(&mut self) {
        if !self.actor.is_overriding_rc() {
            return;
        }
        self.actor.counters.rc_commands.fetch_add(1, Ordering::Relaxed);
        let rc = self.rc.current();
        if let Err(err) = self.actor.vehicle.send(Message::update("rc", rc)).await {
            trace!(vehicle_id = %self.actor.vehicle_id, error = %err, "rc not delivered");
        }
    }

    fn enable_fence(&mut self) -> Result<(), CoreError> {
        if self.fence.is_some() {
            return Ok(());
        }
        let fence = self.ctx.fence.get().ok_or(CoreError::NoFenceConfigured)?;
        self.fence = Some(FenceHandler::new(
            fence,
            self.actor.vehicle.clone(),
            self.actor.user.clone(),
            self.ctx.config.goto_timeout,
        ));
        info!(vehicle_id = %self.actor.vehicle_id, "fence enabled");
        Ok(())
    }

    fn disable_fence(&mut self) {
        if self.fence.take().is_some() {
            info!(vehicle_id = %self.actor.vehicle_id, "fence disabled");
        }
        self.rc.set_auto(None);
    }

    fn shut_down(&mut self) {
        self.disable_fence();
        self.actor.overriding_rc.store(false, Ordering::SeqCst);
        self.actor.vehicle.close();
        self.actor.user.close();
        self.actor.admin.close();
        info!(vehicle_id = %self.actor.vehicle_id, "control actor stopped");
    }
}
