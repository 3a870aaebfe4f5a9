//! Hive Core - control logic for the vehicle hub.
//!
//! This crate implements:
//! - The per-vehicle control actor and its registry
//! - RC arbitration between fence corrections, pilot input and failsafe
//! - Geofence checks and corrective commands
//! - Telemetry persistence and connection events
//! - Connection handlers for vehicles, pilots and dispatchers
//! - A bounded pool for background tasks

#![forbid(unsafe_code)]

// Control
pub mod actor;
pub mod registry;
pub mod rc;

// Geofence
pub mod geofence;
pub mod fence_handler;
pub mod fence_slot;

// Infrastructure
pub mod store;
pub mod telemetry;
pub mod tasks;

// Connection handlers
pub mod nodes;

// Supporting modules
pub mod config;
pub mod errors;
pub mod harness;

pub use actor::ControlActor;
pub use config::{ActorConfig, NodeConfig};
pub use errors::CoreError;
pub use fence_slot::FenceSlot;
pub use geofence::{Correction, Fence, FenceError};
pub use nodes::{DispatcherNode, PilotNode, VehicleNode};
pub use registry::Registry;
pub use store::{InMemoryStore, Store, StoreError};
pub use tasks::{TaskError, TaskHandle, TaskPool};
pub use telemetry::{Telemetry, VehicleEvent};
