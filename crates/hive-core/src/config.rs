//! Runtime tunables for actors and connection handlers.

use hive_transport::LineConfig;
use std::time::Duration;

use crate::rc::DEFAULT_FAILSAFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorConfig {
    /// Inbox sizing for the actor's three lines.
    pub line: LineConfig,
    /// Interval between rc commands while override is active.
    pub rc_tick: Duration,
    /// Pilot input older than this is ignored.
    pub rc_failsafe: Duration,
    /// How long a fence recovery goto may take.
    pub goto_timeout: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            line: LineConfig::default(),
            rc_tick: Duration::from_millis(50),
            rc_failsafe: DEFAULT_FAILSAFE,
            goto_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// Lines created for connected clients.
    pub line: LineConfig,
    /// Connection marker refresh interval.
    pub heartbeat: Duration,
    /// Wait for the vehicle's answer to `info`.
    pub info_timeout: Duration,
    /// Wait for an actor to answer an operator command.
    pub command_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            line: LineConfig {
                grace: Duration::from_millis(10),
                ..LineConfig::default()
            },
            heartbeat: Duration::from_secs(2),
            info_timeout: Duration::from_secs(60),
            command_timeout: Duration::from_secs(10),
        }
    }
}
