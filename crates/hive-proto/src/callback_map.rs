//! Pending callbacks keyed by request id.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::callback::Callback;
use crate::errors::{CallbackError, CorrelationError};

/// Default lifetime of a pending request.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Concurrent id -> callback table.
///
/// Every entry gets the default timeout armed and removes itself once its
/// callback terminates, so the table only ever holds pending requests.
#[derive(Clone)]
pub struct CallbackMap {
    entries: Arc<DashMap<String, Callback>>,
    default_timeout: Duration,
}

impl Default for CallbackMap {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_TIMEOUT)
    }
}

impl CallbackMap {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_timeout,
        }
    }

    /// Register `callback` under `id`.
    pub fn add(&self, id: impl Into<String>, callback: Callback) -> Result<(), CorrelationError> {
        let id = id.into();
        match self.entries.entry(id.clone()) {
            Entry::Occupied(_) => return Err(CorrelationError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                slot.insert(callback.clone());
            }
        }

        callback.timeout(self.default_timeout);

        let entries = Arc::downgrade(&self.entries);
        let serial = callback.serial();
        callback.listen(move |_| {
            if let Some(entries) = entries.upgrade() {
                if entries.remove_if(&id, |_, cb| cb.serial() == serial).is_some() {
                    debug!(id = %id, "callback settled, entry removed");
                }
            }
        });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Callback> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject every pending callback with `error`.
    pub fn reject_all(&self, error: CallbackError) -> usize {
        let pending: Vec<Callback> = self.entries.iter().map(|e| e.value().clone()).collect();
        pending
            .into_iter()
            .filter(|cb| cb.reject(error.clone()))
            .count()
    }
}
