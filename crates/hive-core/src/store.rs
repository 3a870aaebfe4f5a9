//! Key-value storage abstraction for telemetry and hub state.
//!
//! Values are JSON documents. Keys may carry a time-to-live; expired keys
//! behave as absent. The in-memory implementation backs tests and
//! single-process deployments.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ============================================================================
// Store Trait
// ============================================================================

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Store `value`, dropping it after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Live keys starting with `prefix`, sorted.
    async fn find(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Read `key` as `T`.
pub async fn load<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Write `value` under `key`.
pub async fn save<T: Serialize + ?Sized>(store: &dyn Store, key: &str, value: &T) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.set(key, value).await
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory store; expiry is checked lazily on access.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<BTreeMap<String, Entry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    async fn insert(&self, key: &str, value: Value, expires_at: Option<Instant>) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry { value, expires_at });
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.insert(key, value, None).await;
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        self.insert(key, value, Some(Instant::now() + ttl)).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn find(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_proto::models::Position;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_delete() {
        let store = InMemoryStore::new();
        store.set("vehicle:v1", json!({"name": "alpha"})).await.unwrap();
        assert_eq!(store.get("vehicle:v1").await.unwrap(), Some(json!({"name": "alpha"})));

        store.delete("vehicle:v1").await.unwrap();
        assert_eq!(store.get("vehicle:v1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_entries_expire() {
        let store = InMemoryStore::new();
        store
            .set_with_ttl("vehicle:connected:v1", json!(true), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(store.get("vehicle:connected:v1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.get("vehicle:connected:v1").await.unwrap().is_none());
        assert!(store.find("vehicle:connected:").await.unwrap().is_empty());
        assert_eq!(store.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn find_by_prefix() {
        let store = InMemoryStore::new();
        for key in ["vehicle:connected:b", "vehicle:connected:a", "vehicle:position:a", "user:x"] {
            store.set(key, json!(true)).await.unwrap();
        }
        assert_eq!(
            store.find("vehicle:connected:").await.unwrap(),
            vec!["vehicle:connected:a".to_string(), "vehicle:connected:b".to_string()]
        );
    }

    #[tokio::test]
    async fn typed_helpers() {
        let store = InMemoryStore::new();
        let pos = Position::point(1.0, 2.0, 3.0);
        save(&store, "vehicle:position:v1", &pos).await.unwrap();
        let loaded: Option<Position> = load(&store, "vehicle:position:v1").await.unwrap();
        assert_eq!(loaded, Some(pos));

        store.set("bad", json!("text")).await.unwrap();
        assert!(matches!(
            load::<Position>(&store, "bad").await,
            Err(StoreError::Serialization(_))
        ));
    }
}
