use serde::{Deserialize, Serialize};

/// A corner of a fence box as sent by operators. `alt` is relative altitude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }
}

/// Fence definition on the wire: a JSON array of corner points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FencePoints(pub Vec<GeoPoint>);

/// Vehicle state relative to the active fence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FenceState {
    pub slowed: bool,
    pub outside: bool,
}
