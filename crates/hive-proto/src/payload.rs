//! Typed payloads and the decoder table keyed by message type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::callback::Outcome;
use crate::errors::{CallbackError, CodecError};
use crate::models::{Battery, FencePoints, FenceState, Position, Rc, Status, VehicleInfo};

/// Body of a `reply` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyEnvelope {
    pub fn from_outcome(id: impl Into<String>, outcome: &Outcome) -> Self {
        let id = id.into();
        match outcome {
            Ok(result) => Self {
                id,
                result: Some(result.clone()),
                error: None,
            },
            Err(err) => Self {
                id,
                result: None,
                error: Some(err.to_string()),
            },
        }
    }

    /// An error string wins over any result.
    pub fn into_outcome(self) -> Outcome {
        match self.error {
            Some(text) => Err(CallbackError::Rejected(text)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Decoded message data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// No data; serialized as `null`.
    Empty,
    Position(Position),
    Battery(Battery),
    Status(Status),
    Rc(Rc),
    FenceState(FenceState),
    Fence(FencePoints),
    Vehicle(VehicleInfo),
    Reply(ReplyEnvelope),
    /// Opaque JSON for types the hub only relays.
    Json(Value),
}

macro_rules! payload_from {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::$variant(value)
                }
            }
        )*
    };
}

payload_from! {
    Position => Position,
    Battery => Battery,
    Status => Status,
    Rc => Rc,
    FenceState => FenceState,
    FencePoints => Fence,
    VehicleInfo => Vehicle,
    ReplyEnvelope => Reply,
    Value => Json,
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty | Payload::Json(Value::Null))
    }

    pub fn as_position(&self) -> Option<&Position> {
        match self {
            Payload::Position(pos) => Some(pos),
            _ => None,
        }
    }

    pub fn as_rc(&self) -> Option<&Rc> {
        match self {
            Payload::Rc(rc) => Some(rc),
            _ => None,
        }
    }

    pub fn as_fence_state(&self) -> Option<&FenceState> {
        match self {
            Payload::FenceState(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Look up a string field of an opaque JSON payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.as_json()?.get(key)?.as_str()
    }

    pub fn to_value(&self) -> Result<Value, CodecError> {
        serde_json::to_value(self).map_err(CodecError::Encode)
    }
}

/// Turns the raw `data` of a frame into a typed payload.
pub type Decoder = fn(Value) -> Result<Payload, serde_json::Error>;

fn decode_as<T>(value: Value) -> Result<Payload, serde_json::Error>
where
    T: DeserializeOwned + Into<Payload>,
{
    serde_json::from_value::<T>(value).map(Into::into)
}

fn decode_empty(_: Value) -> Result<Payload, serde_json::Error> {
    Ok(Payload::Empty)
}

fn decode_json(value: Value) -> Result<Payload, serde_json::Error> {
    Ok(Payload::Json(value))
}

/// Message type -> payload decoder table.
#[derive(Clone, Default)]
pub struct PayloadRegistry {
    decoders: HashMap<String, Decoder>,
}

impl std::fmt::Debug for PayloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("PayloadRegistry").field("kinds", &kinds).finish()
    }
}

impl PayloadRegistry {
    /// A table with no registered types.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every type exchanged by vehicles, pilots and dispatchers.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register("position", decode_as::<Position>)
            .register("goto", decode_as::<Position>)
            .register("battery", decode_as::<Battery>)
            .register("status", decode_as::<Status>)
            .register("rc", decode_as::<Rc>)
            .register("fence_state", decode_as::<FenceState>)
            .register("fence:set", decode_as::<FencePoints>)
            .register("reply", decode_as::<ReplyEnvelope>);

        for kind in ["info", "takeoff", "land", "rtl"] {
            registry.register(kind, decode_empty);
        }
        for kind in [
            "stop",
            "fence:enable",
            "fence:disable",
            "rc:override:start",
            "rc:override:stop",
            "vehicles",
            "caps",
            "error",
            "webrtc:start",
            "webrtc:sdp",
            "webrtc:icecandidate",
            "webrtc:forward",
        ] {
            registry.register(kind, decode_json);
        }
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, decoder: Decoder) -> &mut Self {
        self.decoders.insert(kind.into(), decoder);
        self
    }

    /// Register a type whose data is relayed untouched.
    pub fn register_opaque(&mut self, kind: impl Into<String>) -> &mut Self {
        self.register(kind, decode_json)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    pub fn decode(&self, kind: &str, data: Value) -> Result<Payload, CodecError> {
        let decoder = self
            .decoders
            .get(kind)
            .ok_or_else(|| CodecError::UnknownType(kind.to_string()))?;
        decoder(data).map_err(|source| CodecError::Payload {
            kind: kind.to_string(),
            source,
        })
    }
}
