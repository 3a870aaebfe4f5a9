use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean earth radius used for the local flat-earth approximation.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A vehicle position sample.
///
/// Latitude and longitude are in degrees, altitudes in meters, speeds in m/s
/// and heading in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
    #[serde(default)]
    pub rel_alt: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default)]
    pub vz: f64,
    #[serde(default)]
    pub hdg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Position {
    /// A point carrying only latitude, longitude and relative altitude.
    pub fn point(lat: f64, lon: f64, rel_alt: f64) -> Self {
        Self {
            lat,
            lon,
            rel_alt,
            ..Self::default()
        }
    }

    /// Stamp the sample with the current wall-clock time.
    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }

    /// Return this position moved `x` meters east, `y` meters north and `z`
    /// meters up.
    ///
    /// Latitude moves first; the longitude step is scaled by the cosine of
    /// the new latitude.
    pub fn translate(&self, x: f64, y: f64, z: f64) -> Self {
        let mut out = *self;
        if x != 0.0 || y != 0.0 {
            out.lat = self.lat + (y / EARTH_RADIUS_M).to_degrees();
            out.lon = self.lon + (x / EARTH_RADIUS_M).to_degrees() / out.lat.to_radians().cos();
        }
        if z != 0.0 {
            out.alt = self.alt + z;
            out.rel_alt = self.rel_alt + z;
        }
        out
    }

    /// Metric offset `(east, north, up)` from this position to `other`.
    ///
    /// The vertical component compares relative altitudes.
    pub fn meter_offset(&self, other: &Position) -> (f64, f64, f64) {
        let d_lat = other.lat - self.lat;
        let d_lon = other.lon - self.lon;
        let x = d_lon.to_radians() * self.lat.to_radians().cos() * EARTH_RADIUS_M;
        let y = d_lat.to_radians() * EARTH_RADIUS_M;
        (x, y, other.rel_alt - self.rel_alt)
    }
}
