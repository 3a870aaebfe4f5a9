//! Error types for the control layer.
//!
//! Each subsystem owns a narrow error enum; [`CoreError`] unifies them at the
//! boundaries where commands are executed on behalf of operators and whose
//! text is relayed back as reply errors.

use hive_proto::{CallbackError, CorrelationError};
use hive_transport::TransportError;
use thiserror::Error;

use crate::geofence::FenceError;
use crate::store::StoreError;
use crate::tasks::TaskError;

// ============================================================================
// Core Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("vehicle not connected")]
    VehicleNotConnected,

    #[error("no fence configured")]
    NoFenceConfigured,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("bad {kind} data format")]
    BadPayload { kind: String },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("bad vehicle info: {0}")]
    BadVehicleInfo(#[source] serde_json::Error),

    #[error(transparent)]
    Fence(#[from] FenceError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl CoreError {
    /// Stable short code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::VehicleNotConnected => "vehicle_not_connected",
            CoreError::NoFenceConfigured => "no_fence",
            CoreError::MissingField(_) => "missing_field",
            CoreError::BadPayload { .. } => "bad_payload",
            CoreError::UnknownCommand(_) => "unknown_command",
            CoreError::BadVehicleInfo(_) => "bad_vehicle_info",
            CoreError::Fence(_) => "fence",
            CoreError::Transport(_) => "transport",
            CoreError::Callback(CallbackError::Timeout) => "timeout",
            CoreError::Callback(_) => "callback",
            CoreError::Correlation(_) => "correlation",
            CoreError::Store(_) => "store",
            CoreError::Task(_) => "task",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_operator_readable() {
        assert_eq!(CoreError::NoFenceConfigured.to_string(), "no fence configured");
        assert_eq!(
            CoreError::from(CallbackError::Rejected("not armed".into())).to_string(),
            "not armed"
        );
        assert_eq!(CoreError::from(CallbackError::Timeout).code(), "timeout");
        assert_eq!(
            CoreError::BadPayload { kind: "fence:set".into() }.to_string(),
            "bad fence:set data format"
        );
    }
}
