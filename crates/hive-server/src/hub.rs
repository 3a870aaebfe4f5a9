//! Composition root: builds the shared services and hands out connection
//! handlers wired to them.

use std::sync::Arc;

use hive_core::actor::ActorContext;
use hive_core::fence_slot::FenceFileError;
use hive_core::{
    DispatcherNode, FenceSlot, InMemoryStore, PilotNode, Registry, Store, TaskPool, Telemetry, VehicleNode,
};
use hive_transport::{Channel, DoneSignal};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::HubConfig;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("fence file: {0}")]
    Fence(#[from] FenceFileError),
}

/// The running hub.
pub struct Hub {
    config: HubConfig,
    store: Arc<InMemoryStore>,
    telemetry: Telemetry,
    fence: FenceSlot,
    tasks: TaskPool,
    registry: Arc<Registry>,
    shutdown: DoneSignal,
}

impl Hub {
    /// Build every service, installing the configured fence if any.
    pub async fn build(config: HubConfig) -> Result<Self, HubError> {
        let store = InMemoryStore::new_shared();
        let shared: Arc<dyn Store> = store.clone();
        let telemetry = Telemetry::new(shared.clone(), config.connection_ttl(), config.topic_config());

        let fence = FenceSlot::new(Some(shared));
        if let Some(path) = &config.fence_file {
            let installed = fence.load_file(path).await?;
            info!(path = %path.display(), min = ?installed.min(), max = ?installed.max(), "fence loaded");
        }

        let tasks = TaskPool::new(config.task_pool_size);
        let registry = Arc::new(Registry::new(ActorContext {
            telemetry: telemetry.clone(),
            fence: fence.clone(),
            config: config.actor_config(),
        }));

        Ok(Self {
            config,
            store,
            telemetry,
            fence,
            tasks,
            registry,
            shutdown: DoneSignal::new(),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn fence(&self) -> &FenceSlot {
        &self.fence
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn tasks(&self) -> &TaskPool {
        &self.tasks
    }

    pub fn vehicle_node(&self, vehicle_id: &str, channel: Arc<dyn Channel>) -> VehicleNode {
        VehicleNode::new(
            vehicle_id,
            channel,
            self.registry.clone(),
            self.telemetry.clone(),
            self.config.node_config(),
        )
    }

    pub fn pilot_node(&self, user_id: &str, vehicle_id: &str, channel: Arc<dyn Channel>) -> PilotNode {
        PilotNode::new(
            user_id,
            vehicle_id,
            channel,
            self.registry.clone(),
            self.config.node_config(),
        )
    }

    pub fn dispatcher_node(&self, channel: Arc<dyn Channel>) -> DispatcherNode {
        DispatcherNode::new(
            channel,
            self.registry.clone(),
            self.fence.clone(),
            self.telemetry.clone(),
            self.tasks.clone(),
            self.config.node_config(),
        )
    }

    /// Periodically drop stopped actors and expired store entries until
    /// shutdown.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        let every = self.config.reap_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = interval.tick() => {
                        let actors = registry.reap_stopped();
                        let entries = store.purge_expired().await;
                        debug!(actors, entries, "reaper pass");
                    }
                }
            }
        })
    }

    /// Stop every actor and background task.
    pub fn shutdown(&self) {
        if self.shutdown.fire() {
            info!(actors = self.registry.len(), "shutting down");
            self.registry.stop_all();
            self.tasks.close();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn loads_the_fence_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"lat": 0, "lon": 0, "alt": 0}}, {{"lat": 1, "lon": 1, "alt": 50}}]"#
        )
        .unwrap();
        let config = HubConfig {
            fence_file: Some(file.path().to_path_buf()),
            ..HubConfig::default()
        };

        let hub = Hub::build(config).await.unwrap();
        let fence = hub.fence().get().unwrap();
        assert_eq!(fence.max().rel_alt, 50.0);
    }

    #[tokio::test]
    async fn bad_fence_file_fails_startup() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[{{"lat": 0, "lon": 0, "alt": 0}}]"#).unwrap();
        let config = HubConfig {
            fence_file: Some(file.path().to_path_buf()),
            ..HubConfig::default()
        };
        assert!(Hub::build(config).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_drops_stopped_actors() {
        let hub = Hub::build(HubConfig {
            reap_interval_secs: 1,
            ..HubConfig::default()
        })
        .await
        .unwrap();
        let reaper = hub.spawn_reaper();

        let actor = hub.registry().get("v1");
        actor.stop();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(hub.registry().is_empty());

        hub.shutdown();
        reaper.await.unwrap();
        assert!(hub.is_shut_down());
    }
}
