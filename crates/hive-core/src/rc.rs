//! Choice of the command actually sent to the vehicle.

use hive_proto::models::Rc;
use std::time::Duration;

/// Manual input older than this is ignored.
pub const DEFAULT_FAILSAFE: Duration = Duration::from_secs(2);

/// Priority: fence correction, then fresh pilot input, then neutral.
#[derive(Debug, Clone)]
pub struct RcArbiter {
    manual: Rc,
    auto: Option<Rc>,
    failsafe: Duration,
}

impl Default for RcArbiter {
    fn default() -> Self {
        Self::new(DEFAULT_FAILSAFE)
    }
}

impl RcArbiter {
    pub fn new(failsafe: Duration) -> Self {
        Self {
            manual: Rc::zero(),
            auto: None,
            failsafe,
        }
    }

    /// Record pilot input, stamped now.
    pub fn set_manual(&mut self, rc: Rc) {
        self.manual = rc;
        self.manual.touch();
    }

    pub fn set_auto(&mut self, rc: Option<Rc>) {
        self.auto = rc;
    }

    pub fn auto(&self) -> Option<&Rc> {
        self.auto.as_ref()
    }

    /// Pilot input if it is still within the failsafe window.
    pub fn fresh_manual(&self) -> Option<Rc> {
        self.manual.is_fresh(self.failsafe).then_some(self.manual)
    }

    /// Fresh pilot input or neutral. Fence corrections start from this.
    pub fn manual_or_zero(&self) -> Rc {
        self.fresh_manual().unwrap_or_else(Rc::zero)
    }

    pub fn current(&self) -> Rc {
        match self.auto {
            Some(rc) => rc,
            None => self.manual_or_zero(),
        }
    }
}
