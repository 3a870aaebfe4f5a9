//! Per-actor fence enforcement.

use hive_proto::models::{FenceState, Position};
use hive_proto::Message;
use hive_transport::Line;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actor::go_to;
use crate::geofence::Fence;
use crate::rc::RcArbiter;

/// Clears the in-flight flag however the recovery task ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Applies one fence to every position sample of a vehicle.
///
/// Recovery runs on its own task rather than the shared task pool, so
/// operator load never delays it. Dropping the handler aborts a recovery
/// still in flight.
pub struct FenceHandler {
    fence: Fence,
    state: FenceState,
    recovering: Arc<AtomicBool>,
    vehicle: Line,
    user: Line,
    goto_timeout: Duration,
    recovery: Option<JoinHandle<()>>,
}

impl FenceHandler {
    pub fn new(fence: Fence, vehicle: Line, user: Line, goto_timeout: Duration) -> Self {
        Self {
            fence,
            state: FenceState::default(),
            recovering: Arc::new(AtomicBool::new(false)),
            vehicle,
            user,
            goto_timeout,
            recovery: None,
        }
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    pub fn state(&self) -> FenceState {
        self.state
    }

    /// A recovery goto is in flight.
    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    /// Recompute the correction for `pos`. Skipped while a recovery goto is
    /// in flight.
    pub async fn check(&mut self, pos: &Position, arbiter: &mut RcArbiter) {
        if self.is_recovering() {
            return;
        }

        let correction = self.fence.auto_rc(pos, &arbiter.manual_or_zero());
        arbiter.set_auto(Some(correction.rc));

        let state = FenceState {
            slowed: correction.slowed,
            outside: correction.outside,
        };
        if state != self.state {
            self.state = state;
            debug!(slowed = state.slowed, outside = state.outside, "fence state changed");
            if let Err(err) = self.user.send(Message::update("fence_state", state)).await {
                debug!(error = %err, "fence state not delivered");
            }
        }

        if let Some(target) = correction.target {
            self.recover(target);
        }
    }

    fn recover(&mut self, target: Position) {
        // Per-recovery flag: an aborted task only clears its own.
        self.recovering = Arc::new(AtomicBool::new(true));
        let in_flight = InFlight(self.recovering.clone());
        let vehicle = self.vehicle.clone();
        let timeout = self.goto_timeout;
        info!(lat = target.lat, lon = target.lon, rel_alt = target.rel_alt, "outside fence, sending vehicle back");

        self.recovery = Some(tokio::spawn(async move {
            let _in_flight = in_flight;
            if let Err(err) = go_to(&vehicle, target, timeout).await {
                warn!(error = %err, "fence recovery failed");
            }
        }));
    }

    /// Abort an in-flight recovery goto and resume fence checks.
    pub fn cancel_recovery(&mut self) {
        if let Some(recovery) = self.recovery.take() {
            if !recovery.is_finished() {
                recovery.abort();
                debug!("fence recovery aborted");
            }
            self.recovering = Arc::new(AtomicBool::new(false));
        }
    }
}

impl Drop for FenceHandler {
    fn drop(&mut self) {
        self.cancel_recovery();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rc::DEFAULT_FAILSAFE;
    use hive_transport::LineConfig;

    fn handler() -> (FenceHandler, Line, Line) {
        let fence = Fence::new(Position::point(0.0, 0.0, 0.0), Position::point(10.0, 10.0, 10.0)).unwrap();
        let vehicle = Line::new("vehicle", false, LineConfig::default());
        let remote_vehicle = Line::new("remote-vehicle", false, LineConfig::default());
        vehicle.connect(&remote_vehicle);
        let user = Line::new("user", false, LineConfig::default());
        let remote_user = Line::new("remote-user", false, LineConfig::default());
        user.connect(&remote_user);
        let handler = FenceHandler::new(fence, vehicle, user, Duration::from_secs(60));
        (handler, remote_vehicle, remote_user)
    }

    #[tokio::test(start_paused = true)]
    async fn outside_sample_starts_one_recovery() {
        let (mut handler, remote_vehicle, remote_user) = handler();
        let mut arbiter = RcArbiter::new(DEFAULT_FAILSAFE);
        let outside = Position::point(5.0, 11.0, 5.0);

        handler.check(&outside, &mut arbiter).await;
        assert!(handler.state().outside);
        assert!(handler.is_recovering());
        assert_eq!(remote_user.recv().await.unwrap().kind(), "fence_state");
        assert_eq!(remote_vehicle.recv().await.unwrap().kind(), "goto");

        handler.check(&outside, &mut arbiter).await;
        let again = tokio::time::timeout(Duration::from_millis(200), remote_vehicle.recv()).await;
        assert!(again.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_recovery_resumes_checks() {
        let (mut handler, remote_vehicle, _remote_user) = handler();
        let mut arbiter = RcArbiter::new(DEFAULT_FAILSAFE);
        let outside = Position::point(5.0, 11.0, 5.0);

        handler.check(&outside, &mut arbiter).await;
        assert_eq!(remote_vehicle.recv().await.unwrap().kind(), "goto");
        assert!(handler.is_recovering());

        handler.cancel_recovery();
        assert!(!handler.is_recovering());

        handler.check(&outside, &mut arbiter).await;
        assert_eq!(remote_vehicle.recv().await.unwrap().kind(), "goto");
    }
}
