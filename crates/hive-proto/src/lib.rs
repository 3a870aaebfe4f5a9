//! Hive Proto - wire model for the vehicle control hub.
//!
//! This crate implements:
//! - Telemetry and control models (position, rc, fence points, battery, status)
//! - The message envelope shared by every endpoint of the hub
//! - Payload decoding keyed by message type
//! - JSON frame codec
//! - Request/reply correlation (callbacks and the callback map)

#![forbid(unsafe_code)]

// Data models
pub mod models;

// Envelope and payloads
pub mod message;
pub mod payload;
pub mod codec;

// Correlation
pub mod callback;
pub mod callback_map;

// Supporting modules
pub mod errors;

pub use callback::{Callback, Outcome};
pub use callback_map::CallbackMap;
pub use codec::Codec;
pub use errors::{CallbackError, CodecError, CorrelationError, RcError};
pub use message::{Message, Verb};
pub use payload::{Payload, PayloadRegistry, ReplyEnvelope};
