//! The endpoint abstraction shared by lines and wire channels.

use async_trait::async_trait;
use hive_proto::{CodecError, CorrelationError, Message};
use std::time::Duration;

use crate::done::DoneSignal;

/// Common transport error type
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No peer is attached.
    #[error("not connected")]
    NotConnected,

    /// The receiving side has terminated.
    #[error("disconnected")]
    Disconnected,

    /// The receiver did not accept the message within its grace window.
    #[error("message discarded by {endpoint}: not read within {grace:?}")]
    Discarded { endpoint: String, grace: Duration },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("correlation error: {0}")]
    Correlation(#[from] CorrelationError),
}

/// A bidirectional message endpoint.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Deliver a message to the far side.
    async fn send(&self, msg: Message) -> Result<(), TransportError>;

    /// Next inbound message; `None` once the endpoint is done.
    async fn recv(&self) -> Option<Message>;

    /// Fires when the endpoint terminates.
    fn done(&self) -> DoneSignal;

    /// Detach from the far side.
    fn disconnect(&self);

    /// Short label for logs.
    fn name(&self) -> &str;
}
