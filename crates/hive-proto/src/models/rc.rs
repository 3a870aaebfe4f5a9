use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::RcError;

/// Normalized stick command. Every axis lives in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rc {
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub throttle: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub gimbal: f64,
    /// When the command was last refreshed by its producer.
    #[serde(skip)]
    pub updated: Option<Instant>,
}

/// Per-axis bounds applied by the geofence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RcLimits {
    pub roll_max: f64,
    pub roll_min: f64,
    pub pitch_max: f64,
    pub pitch_min: f64,
    pub throttle_max: f64,
    pub throttle_min: f64,
}

impl Default for RcLimits {
    fn default() -> Self {
        Self {
            roll_max: 1.0,
            roll_min: -1.0,
            pitch_max: 1.0,
            pitch_min: -1.0,
            throttle_max: 1.0,
            throttle_min: -1.0,
        }
    }
}

fn check_axis(axis: &'static str, value: f64) -> Result<(), RcError> {
    if (-1.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RcError::OutOfRange { axis, value })
    }
}

impl Rc {
    /// All axes neutral.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build a command, rejecting any axis outside `[-1, 1]`.
    pub fn new(roll: f64, pitch: f64, throttle: f64, yaw: f64, gimbal: f64) -> Result<Self, RcError> {
        let rc = Self {
            roll,
            pitch,
            throttle,
            yaw,
            gimbal,
            updated: None,
        };
        rc.validate()?;
        Ok(rc)
    }

    pub fn validate(&self) -> Result<(), RcError> {
        check_axis("roll", self.roll)?;
        check_axis("pitch", self.pitch)?;
        check_axis("throttle", self.throttle)?;
        check_axis("yaw", self.yaw)?;
        check_axis("gimbal", self.gimbal)
    }

    pub fn set_roll(&mut self, value: f64) -> Result<(), RcError> {
        check_axis("roll", value)?;
        self.roll = value;
        Ok(())
    }

    pub fn set_pitch(&mut self, value: f64) -> Result<(), RcError> {
        check_axis("pitch", value)?;
        self.pitch = value;
        Ok(())
    }

    pub fn set_throttle(&mut self, value: f64) -> Result<(), RcError> {
        check_axis("throttle", value)?;
        self.throttle = value;
        Ok(())
    }

    pub fn set_yaw(&mut self, value: f64) -> Result<(), RcError> {
        check_axis("yaw", value)?;
        self.yaw = value;
        Ok(())
    }

    pub fn set_gimbal(&mut self, value: f64) -> Result<(), RcError> {
        check_axis("gimbal", value)?;
        self.gimbal = value;
        Ok(())
    }

    /// Mark the command as refreshed now.
    pub fn touch(&mut self) {
        self.updated = Some(Instant::now());
    }

    /// Time since the last refresh, `None` if never refreshed.
    pub fn since_update(&self) -> Option<Duration> {
        self.updated.map(|at| at.elapsed())
    }

    /// True when the command was refreshed less than `window` ago.
    pub fn is_fresh(&self, window: Duration) -> bool {
        self.since_update().is_some_and(|age| age < window)
    }

    /// Same stick values, ignoring the refresh timestamp.
    pub fn same_axes(&self, other: &Rc) -> bool {
        self.roll == other.roll
            && self.pitch == other.pitch
            && self.throttle == other.throttle
            && self.yaw == other.yaw
            && self.gimbal == other.gimbal
    }

    /// Rotate the horizontal (roll, pitch) vector by `deg` degrees.
    pub fn rotate(&mut self, deg: f64) {
        let len = self.roll.hypot(self.pitch);
        let angle = self.pitch.atan2(self.roll) + deg.to_radians();
        self.roll = angle.cos() * len;
        self.pitch = angle.sin() * len;
    }

    /// Clamp roll, pitch and throttle into `limits`. Returns true when any
    /// axis changed.
    pub fn apply_limits(&mut self, limits: &RcLimits) -> bool {
        let mut changed = false;
        let mut bound = |value: &mut f64, min: f64, max: f64| {
            if *value > max {
                *value = max;
                changed = true;
            }
            if *value < min {
                *value = min;
                changed = true;
            }
        };
        bound(&mut self.roll, limits.roll_min, limits.roll_max);
        bound(&mut self.pitch, limits.pitch_min, limits.pitch_max);
        bound(&mut self.throttle, limits.throttle_min, limits.throttle_max);
        changed
    }

    /// Pull every axis back into `[-1, 1]`.
    pub fn clamp_unit(&mut self) {
        for axis in [
            &mut self.roll,
            &mut self.pitch,
            &mut self.throttle,
            &mut self.yaw,
            &mut self.gimbal,
        ] {
            *axis = axis.clamp(-1.0, 1.0);
        }
    }
}
