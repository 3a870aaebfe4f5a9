//! Vehicle id -> control actor.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::actor::{ActorContext, ControlActor};

/// Creates actors on first use. A stopped actor is replaced on the next
/// lookup and dropped by [`Registry::reap_stopped`].
pub struct Registry {
    actors: DashMap<String, Arc<ControlActor>>,
    ctx: ActorContext,
}

impl Registry {
    pub fn new(ctx: ActorContext) -> Self {
        Self {
            actors: DashMap::new(),
            ctx,
        }
    }

    pub fn context(&self) -> &ActorContext {
        &self.ctx
    }

    /// The running actor for `vehicle_id`, spawning one if needed.
    pub fn get(&self, vehicle_id: &str) -> Arc<ControlActor> {
        if let Some(actor) = self.actors.get(vehicle_id) {
            if !actor.is_stopped() {
                return actor.clone();
            }
        }

        match self.actors.entry(vehicle_id.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_stopped() {
                    let actor = ControlActor::spawn(vehicle_id, self.ctx.clone());
                    slot.insert(actor.clone());
                    debug!(vehicle_id, "replaced stopped control actor");
                    actor
                } else {
                    slot.get().clone()
                }
            }
            Entry::Vacant(slot) => {
                let actor = ControlActor::spawn(vehicle_id, self.ctx.clone());
                slot.insert(actor.clone());
                actor
            }
        }
    }

    /// The actor for `vehicle_id` without creating one.
    pub fn peek(&self, vehicle_id: &str) -> Option<Arc<ControlActor>> {
        self.actors.get(vehicle_id).map(|actor| actor.clone())
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn vehicle_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.actors.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Forget actors whose loop has terminated.
    pub fn reap_stopped(&self) -> usize {
        let before = self.actors.len();
        self.actors.retain(|_, actor| !actor.is_stopped());
        let reaped = before.saturating_sub(self.actors.len());
        if reaped > 0 {
            info!(reaped, "reaped stopped control actors");
        }
        reaped
    }

    /// Stop every actor.
    pub fn stop_all(&self) {
        for actor in self.actors.iter() {
            actor.stop();
        }
    }
}
