//! Axis-aligned geofence and the corrective command it derives.
//!
//! The fence is a box in (latitude, longitude, relative altitude). Inside the
//! box, stick input is limited proportionally to the distance left to each
//! face within a probe margin. Outside, the vehicle is stopped and a target
//! just inside the nearest boundary is produced.

use hive_proto::models::{FencePoints, GeoPoint, Position, Rc, RcLimits};
use thiserror::Error;

/// Distance probed ahead of the vehicle along each axis, in meters.
pub const PROBE_MARGIN_M: f64 = 15.0;

/// How far inside the boundary a recovery target is placed, in meters.
pub const RETREAT_M: f64 = 5.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FenceError {
    #[error("fence should have exactly two points, got {0}")]
    PointCount(usize),

    #[error("fence is not valid: first corner must be below the second on every axis")]
    Inverted,
}

/// Fence box with `min` strictly below `max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fence {
    min: Position,
    max: Position,
}

/// Result of evaluating a position against the fence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Command to use instead of the raw pilot input.
    pub rc: Rc,
    /// Recovery target, set only when outside.
    pub target: Option<Position>,
    /// Some axis was limited.
    pub slowed: bool,
    pub outside: bool,
}

impl Fence {
    pub fn new(min: Position, max: Position) -> Result<Self, FenceError> {
        let valid = min.lat < max.lat && min.lon < max.lon && min.rel_alt < max.rel_alt;
        if !valid {
            return Err(FenceError::Inverted);
        }
        Ok(Self { min, max })
    }

    /// Build from the two operator-supplied corners. The point `alt` is
    /// taken as relative altitude.
    pub fn from_points(points: &FencePoints) -> Result<Self, FenceError> {
        match points.0.as_slice() {
            [a, b] => Self::new(
                Position::point(a.lat, a.lon, a.alt),
                Position::point(b.lat, b.lon, b.alt),
            ),
            other => Err(FenceError::PointCount(other.len())),
        }
    }

    pub fn to_points(&self) -> FencePoints {
        FencePoints(vec![
            GeoPoint::new(self.min.lat, self.min.lon, self.min.rel_alt),
            GeoPoint::new(self.max.lat, self.max.lon, self.max.rel_alt),
        ])
    }

    pub fn min(&self) -> &Position {
        &self.min
    }

    pub fn max(&self) -> &Position {
        &self.max
    }

    /// Inclusive containment test.
    pub fn check(&self, pos: &Position) -> bool {
        pos.lon <= self.max.lon
            && pos.lon >= self.min.lon
            && pos.lat <= self.max.lat
            && pos.lat >= self.min.lat
            && pos.rel_alt <= self.max.rel_alt
            && pos.rel_alt >= self.min.rel_alt
    }

    /// Corrected command for a vehicle at `pos` driven by `manual`.
    pub fn auto_rc(&self, pos: &Position, manual: &Rc) -> Correction {
        if !self.check(pos) {
            return Correction {
                rc: Rc::zero(),
                target: Some(self.recovery_target(pos)),
                slowed: false,
                outside: true,
            };
        }

        let limits = self.limits_at(pos);
        let mut rc = *manual;
        rc.rotate(-pos.hdg);
        let slowed = rc.apply_limits(&limits);
        rc.rotate(pos.hdg);
        rc.clamp_unit();

        Correction {
            rc,
            target: None,
            slowed,
            outside: false,
        }
    }

    /// Clamp every out-of-range axis to the boundary, then step inward.
    fn recovery_target(&self, pos: &Position) -> Position {
        let mut target = *pos;
        let (mut tx, mut ty, mut tz) = (0.0, 0.0, 0.0);

        if target.lon > self.max.lon {
            target.lon = self.max.lon;
            tx = -RETREAT_M;
        } else if target.lon < self.min.lon {
            target.lon = self.min.lon;
            tx = RETREAT_M;
        }

        if target.lat > self.max.lat {
            target.lat = self.max.lat;
            ty = -RETREAT_M;
        } else if target.lat < self.min.lat {
            target.lat = self.min.lat;
            ty = RETREAT_M;
        }

        if target.rel_alt > self.max.rel_alt {
            target.rel_alt = self.max.rel_alt;
            tz = -RETREAT_M;
        } else if target.rel_alt < self.min.rel_alt {
            target.rel_alt = self.min.rel_alt;
            tz = RETREAT_M;
        }

        target.translate(tx, ty, tz)
    }

    /// Per-axis limits from probes `PROBE_MARGIN_M` ahead on each side.
    fn limits_at(&self, pos: &Position) -> RcLimits {
        let m = PROBE_MARGIN_M;
        let (xa, ya, za) = pos.meter_offset(&self.min);
        let (xb, yb, zb) = pos.meter_offset(&self.max);

        let mut limits = RcLimits::default();
        if !self.check(&pos.translate(m, 0.0, 0.0)) {
            limits.roll_max = xb / m;
        }
        if !self.check(&pos.translate(-m, 0.0, 0.0)) {
            limits.roll_min = xa / m;
        }
        if !self.check(&pos.translate(0.0, m, 0.0)) {
            limits.pitch_max = yb / m;
        }
        if !self.check(&pos.translate(0.0, -m, 0.0)) {
            limits.pitch_min = ya / m;
        }
        if !self.check(&pos.translate(0.0, 0.0, m)) {
            limits.throttle_max = zb / m;
        }
        if !self.check(&pos.translate(0.0, 0.0, -m)) {
            limits.throttle_min = za / m;
        }
        limits
    }
}
