//! Vehicle telemetry persistence and connection events.

use hive_proto::models::{Battery, Position, Status, VehicleInfo};
use hive_transport::{Subscription, Topic, TopicConfig};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::store::{load, save, Store, StoreError};

const POSITION_PREFIX: &str = "vehicle:position:";
const BATTERY_PREFIX: &str = "vehicle:battery:";
const STATUS_PREFIX: &str = "vehicle:status:";
const CONNECTED_PREFIX: &str = "vehicle:connected:";
const INFO_PREFIX: &str = "vehicle:";

/// Default lifetime of a connection marker without heartbeat.
pub const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(5);

/// Published when a vehicle comes or goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleEvent {
    Connected(String),
    Disconnected(String),
}

#[derive(Clone)]
pub struct Telemetry {
    store: Arc<dyn Store>,
    events: Arc<Topic<VehicleEvent>>,
    connection_ttl: Duration,
}

impl Telemetry {
    pub fn new(store: Arc<dyn Store>, connection_ttl: Duration, topic: TopicConfig) -> Self {
        Self {
            store,
            events: Arc::new(Topic::new("vehicles", topic)),
            connection_ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn set_position(&self, vehicle_id: &str, pos: &Position) -> Result<(), StoreError> {
        save(self.store.as_ref(), &format!("{POSITION_PREFIX}{vehicle_id}"), pos).await
    }

    pub async fn position(&self, vehicle_id: &str) -> Result<Option<Position>, StoreError> {
        load(self.store.as_ref(), &format!("{POSITION_PREFIX}{vehicle_id}")).await
    }

    pub async fn set_battery(&self, vehicle_id: &str, battery: &Battery) -> Result<(), StoreError> {
        save(self.store.as_ref(), &format!("{BATTERY_PREFIX}{vehicle_id}"), battery).await
    }

    pub async fn battery(&self, vehicle_id: &str) -> Result<Option<Battery>, StoreError> {
        load(self.store.as_ref(), &format!("{BATTERY_PREFIX}{vehicle_id}")).await
    }

    pub async fn set_status(&self, vehicle_id: &str, status: &Status) -> Result<(), StoreError> {
        save(self.store.as_ref(), &format!("{STATUS_PREFIX}{vehicle_id}"), status).await
    }

    pub async fn status(&self, vehicle_id: &str) -> Result<Option<Status>, StoreError> {
        load(self.store.as_ref(), &format!("{STATUS_PREFIX}{vehicle_id}")).await
    }

    pub async fn save_info(&self, info: &VehicleInfo) -> Result<(), StoreError> {
        save(self.store.as_ref(), &format!("{INFO_PREFIX}{}", info.id), info).await
    }

    pub async fn info(&self, vehicle_id: &str) -> Result<Option<VehicleInfo>, StoreError> {
        load(self.store.as_ref(), &format!("{INFO_PREFIX}{vehicle_id}")).await
    }

    /// Mark the vehicle online and announce it.
    pub async fn mark_connected(&self, vehicle_id: &str) -> Result<(), StoreError> {
        self.heartbeat(vehicle_id).await?;
        info!(vehicle_id, "vehicle connected");
        self.events.publish(VehicleEvent::Connected(vehicle_id.to_string())).await;
        Ok(())
    }

    /// Refresh the online marker without announcing.
    pub async fn heartbeat(&self, vehicle_id: &str) -> Result<(), StoreError> {
        self.store
            .set_with_ttl(&format!("{CONNECTED_PREFIX}{vehicle_id}"), Value::Bool(true), self.connection_ttl)
            .await
    }

    pub async fn mark_disconnected(&self, vehicle_id: &str) -> Result<(), StoreError> {
        self.store.delete(&format!("{CONNECTED_PREFIX}{vehicle_id}")).await?;
        info!(vehicle_id, "vehicle disconnected");
        self.events.publish(VehicleEvent::Disconnected(vehicle_id.to_string())).await;
        Ok(())
    }

    pub async fn is_connected(&self, vehicle_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get(&format!("{CONNECTED_PREFIX}{vehicle_id}"))
            .await?
            .is_some())
    }

    /// Ids of vehicles with a live connection marker, sorted.
    pub async fn connected_vehicles(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.store.find(CONNECTED_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(CONNECTED_PREFIX).map(str::to_string))
            .collect())
    }

    pub fn subscribe(&self) -> Subscription<VehicleEvent> {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, sub: &Subscription<VehicleEvent>) -> bool {
        self.events.unsubscribe(sub)
    }
}
