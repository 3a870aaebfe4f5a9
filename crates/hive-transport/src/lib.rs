//! Message plumbing for the Hive hub.
//!
//! Lines connect two endpoints inside the process, topics fan events out to
//! subscribers, and wire channels carry messages over text frames to remote
//! peers. Everything a connection handler talks to implements [`Channel`].

pub mod channel;
pub mod done;
pub mod line;
pub mod topic;
pub mod wire;
pub mod testing;

pub use channel::{Channel, TransportError};
pub use done::DoneSignal;
pub use line::{Line, LineConfig, LineStats};
pub use topic::{Subscription, Topic, TopicConfig};
pub use wire::{WireChannel, WireConfig};
