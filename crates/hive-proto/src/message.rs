//! The envelope exchanged by every hub endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::callback::{Callback, Outcome};
use crate::errors::{CallbackError, CorrelationError};
use crate::payload::Payload;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Next process-wide message id. Ids increase monotonically.
pub fn next_id() -> String {
    NEXT_ID.fetch_add(1, Ordering::Relaxed).to_string()
}

/// Whether a message expects a reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verb {
    #[serde(rename = "req")]
    Request,
    #[default]
    #[serde(rename = "upd")]
    Update,
}

/// A typed message.
///
/// A request always carries a [`Callback`]; an update never does.
#[derive(Debug, Clone)]
pub struct Message {
    id: String,
    verb: Verb,
    kind: String,
    data: Payload,
    callback: Option<Callback>,
}

impl Message {
    /// A fire-and-forget message with a fresh id.
    pub fn update(kind: impl Into<String>, data: impl Into<Payload>) -> Self {
        Self {
            id: next_id(),
            verb: Verb::Update,
            kind: kind.into(),
            data: data.into(),
            callback: None,
        }
    }

    /// A request with a fresh id. A callback is created when none is given.
    pub fn request(kind: impl Into<String>, data: impl Into<Payload>, callback: Option<Callback>) -> Self {
        Self {
            id: next_id(),
            verb: Verb::Request,
            kind: kind.into(),
            data: data.into(),
            callback: Some(callback.unwrap_or_default()),
        }
    }

    /// Rebuild a message received from a peer, keeping its id.
    pub fn from_parts(id: impl Into<String>, verb: Verb, kind: impl Into<String>, data: Payload) -> Self {
        let callback = match verb {
            Verb::Request => Some(Callback::new()),
            Verb::Update => None,
        };
        Self {
            id: id.into(),
            verb,
            kind: kind.into(),
            data,
            callback,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The `i`th colon-separated segment of the type, e.g. `sdp` for
    /// `webrtc:sdp` at index 1.
    pub fn sub_kind(&self, i: usize) -> Option<&str> {
        self.kind.split(':').nth(i)
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn into_data(self) -> Payload {
        self.data
    }

    /// Swap the payload, returning the previous one.
    pub fn replace_data(&mut self, data: impl Into<Payload>) -> Payload {
        std::mem::replace(&mut self.data, data.into())
    }

    pub fn is_request(&self) -> bool {
        self.callback.is_some()
    }

    pub fn callback(&self) -> Option<&Callback> {
        self.callback.as_ref()
    }

    /// Complete this request with `outcome`.
    ///
    /// Fails with [`CorrelationError::NotARequest`] for updates. A request
    /// that already terminated ignores the outcome.
    pub fn reply<E: fmt::Display>(&self, outcome: Result<Value, E>) -> Result<(), CorrelationError> {
        let callback = self
            .callback
            .as_ref()
            .ok_or_else(|| CorrelationError::NotARequest(self.id.clone()))?;
        let outcome: Outcome = outcome.map_err(|e| CallbackError::Rejected(e.to_string()));
        callback.finish(outcome);
        Ok(())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.verb {
            Verb::Request => "req",
            Verb::Update => "upd",
        };
        write!(f, "{}#{}({})", self.kind, self.id, verb)
    }
}
