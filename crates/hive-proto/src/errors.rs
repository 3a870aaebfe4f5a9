//! Error types for the wire model.

use thiserror::Error;

/// Terminal failure of a callback.
///
/// Cloned into every listener and waiter, so it carries text rather than
/// source errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("timeout")]
    Timeout,

    #[error("canceled")]
    Canceled,

    /// Rejected by the far side or by local logic, with its error text.
    #[error("{0}")]
    Rejected(String),
}

/// Errors raised while correlating requests and replies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("callback already registered for id {0}")]
    DuplicateId(String),

    #[error("message {0} is not a request")]
    NotARequest(String),
}

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Frame(#[source] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("bad payload for {kind}: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Rejection of an out-of-range rc axis value.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum RcError {
    #[error("{axis} value {value} is outside [-1, 1]")]
    OutOfRange { axis: &'static str, value: f64 },
}
