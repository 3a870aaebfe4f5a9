//! Telemetry and control models carried as message payloads.

mod fence;
mod position;
mod rc;
mod vehicle;

pub use fence::{FencePoints, FenceState, GeoPoint};
pub use position::{Position, EARTH_RADIUS_M};
pub use rc::{Rc, RcLimits};
pub use vehicle::{Battery, Status, VehicleInfo};
