//! The currently configured fence, shared by every actor.

use hive_proto::models::FencePoints;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::errors::CoreError;
use crate::geofence::Fence;
use crate::store::{load, save, Store};

const FENCE_KEY: &str = "fence";

#[derive(Clone)]
pub struct FenceSlot {
    current: Arc<RwLock<Option<Fence>>>,
    store: Option<Arc<dyn Store>>,
}

impl Default for FenceSlot {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FenceSlot {
    /// With a store, every change is persisted under `fence`.
    pub fn new(store: Option<Arc<dyn Store>>) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            store,
        }
    }

    pub fn get(&self) -> Option<Fence> {
        *self.current.read()
    }

    /// Validate, persist and install a new fence.
    pub async fn set(&self, points: &FencePoints) -> Result<Fence, CoreError> {
        let fence = Fence::from_points(points)?;
        if let Some(store) = &self.store {
            save(store.as_ref(), FENCE_KEY, &fence.to_points()).await?;
        }
        *self.current.write() = Some(fence);
        info!(min = ?fence.min(), max = ?fence.max(), "fence configured");
        Ok(fence)
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// Install the fence persisted by a previous run, if any.
    pub async fn restore(&self) -> Result<Option<Fence>, CoreError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(points) = load::<FencePoints>(store.as_ref(), FENCE_KEY).await? else {
            return Ok(None);
        };
        let fence = Fence::from_points(&points)?;
        *self.current.write() = Some(fence);
        Ok(Some(fence))
    }

    /// Load a JSON array of two corner points from `path`.
    pub async fn load_file(&self, path: &Path) -> Result<Fence, FenceFileError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|source| FenceFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let points: FencePoints = serde_json::from_str(&raw)?;
        Ok(self.set(&points).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FenceFileError {
    #[error("cannot read fence file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("fence file is not a point list: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}
