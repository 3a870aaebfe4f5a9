//! Test harness for hub-level scenarios.
//!
//! Wires an in-memory store, telemetry, fence slot, task pool and registry
//! together, and offers shortcuts for attaching simulated endpoints.

use hive_proto::models::{FencePoints, GeoPoint};
use hive_proto::{Callback, Message, Outcome, Payload};
use hive_transport::{Line, TopicConfig};
use std::sync::Arc;
use std::time::Duration;

use crate::actor::{ActorContext, ControlActor};
use crate::config::ActorConfig;
use crate::errors::CoreError;
use crate::fence_slot::FenceSlot;
use crate::geofence::Fence;
use crate::registry::Registry;
use crate::store::{InMemoryStore, Store};
use crate::tasks::TaskPool;
use crate::telemetry::{Telemetry, DEFAULT_CONNECTION_TTL};

/// A hub with in-memory dependencies.
pub struct TestHub {
    pub store: Arc<InMemoryStore>,
    pub telemetry: Telemetry,
    pub fence: FenceSlot,
    pub tasks: TaskPool,
    pub registry: Arc<Registry>,
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new(ActorConfig::default())
    }
}

impl TestHub {
    pub fn new(config: ActorConfig) -> Self {
        let store = InMemoryStore::new_shared();
        let shared: Arc<dyn Store> = store.clone();
        let telemetry = Telemetry::new(shared.clone(), DEFAULT_CONNECTION_TTL, TopicConfig::default());
        let fence = FenceSlot::new(Some(shared));
        let tasks = TaskPool::new(4);
        let registry = Arc::new(Registry::new(ActorContext {
            telemetry: telemetry.clone(),
            fence: fence.clone(),
            config,
        }));
        Self {
            store,
            telemetry,
            fence,
            tasks,
            registry,
        }
    }

    /// Install the box `(lat, lon, rel_alt)` from `min` to `max`.
    pub async fn set_fence(&self, min: (f64, f64, f64), max: (f64, f64, f64)) -> Result<Fence, CoreError> {
        let points = FencePoints(vec![
            GeoPoint::new(min.0, min.1, min.2),
            GeoPoint::new(max.0, max.1, max.2),
        ]);
        self.fence.set(&points).await
    }

    /// A client-side line connected to the actor's vehicle side.
    pub fn attach_vehicle(&self, vehicle_id: &str) -> (Arc<ControlActor>, Line) {
        let actor = self.registry.get(vehicle_id);
        let line = Line::new(format!("test-vehicle:{vehicle_id}"), true, Default::default());
        actor.connect_vehicle(&line);
        (actor, line)
    }

    /// A client-side line connected to the actor's pilot side.
    pub fn attach_pilot(&self, vehicle_id: &str) -> (Arc<ControlActor>, Line) {
        let actor = self.registry.get(vehicle_id);
        let line = Line::new(format!("test-pilot:{vehicle_id}"), true, Default::default());
        actor.connect_user(&line);
        (actor, line)
    }
}

/// Push an operator command to `actor` and wait for its answer.
pub async fn command(actor: &ControlActor, kind: &str) -> Outcome {
    let callback = Callback::new();
    let msg = Message::request(kind, Payload::Empty, Some(callback.clone()));
    if let Err(err) = actor.push(msg).await {
        return Err(hive_proto::CallbackError::Rejected(err.to_string()));
    }
    callback.timeout(Duration::from_secs(5));
    callback.wait().await
}

/// Next message on `line` within `within`, skipping kinds in `skip`.
pub async fn next_except(line: &Line, skip: &[&str], within: Duration) -> Option<Message> {
    tokio::time::timeout(within, async {
        loop {
            let msg = line.recv().await?;
            if !skip.contains(&msg.kind()) {
                return Some(msg);
            }
        }
    })
    .await
    .ok()
    .flatten()
}
