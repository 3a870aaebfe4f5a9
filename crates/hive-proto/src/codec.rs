//! JSON text frames: `{"id", "verb", "type", "data"}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::errors::CodecError;
use crate::message::{next_id, Message, Verb};
use crate::payload::{Payload, PayloadRegistry};

#[derive(Serialize)]
struct FrameOut<'a> {
    id: &'a str,
    verb: Verb,
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a Payload,
}

#[derive(Deserialize)]
struct FrameIn {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    verb: Verb,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Encodes messages to frames and decodes frames through a payload table.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: Arc<PayloadRegistry>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(PayloadRegistry::standard())
    }
}

impl Codec {
    pub fn new(registry: PayloadRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &PayloadRegistry {
        &self.registry
    }

    pub fn encode(&self, msg: &Message) -> Result<String, CodecError> {
        let frame = FrameOut {
            id: msg.id(),
            verb: msg.verb(),
            kind: msg.kind(),
            data: msg.data(),
        };
        serde_json::to_string(&frame).map_err(CodecError::Encode)
    }

    /// Decode a frame. Requests come back with a fresh callback attached;
    /// frames without an id get a local one.
    pub fn decode(&self, frame: &str) -> Result<Message, CodecError> {
        let raw: FrameIn = serde_json::from_str(frame).map_err(CodecError::Frame)?;
        let data = self.registry.decode(&raw.kind, raw.data)?;
        let id = raw.id.filter(|id| !id.is_empty()).unwrap_or_else(next_id);
        Ok(Message::from_parts(id, raw.verb, raw.kind, data))
    }
}
