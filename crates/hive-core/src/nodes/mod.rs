//! Connection handlers bridging remote channels to control actors.
//!
//! A handler owns one [`Channel`](hive_transport::Channel) and runs until
//! either the channel or the hub side ends.

mod dispatcher;
mod pilot;
mod vehicle;

pub use dispatcher::DispatcherNode;
pub use pilot::PilotNode;
pub use vehicle::VehicleNode;
