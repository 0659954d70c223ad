//! Offboard engagement: request the mode, then arming, each attempt gated by
//! a cooldown. The phase is recomputed from live vehicle state every tick, so
//! an external mode change or disarm puts the controller back to work.

use offb_proto::{Pose, TargetPose, VehicleState};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::link::FlightLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RequestingMode,
    RequestingArm,
    Engaged,
}

impl Phase {
    pub fn of(state: &VehicleState, mode: &str) -> Phase {
        if !state.in_mode(mode) {
            Phase::RequestingMode
        } else if !state.armed {
            Phase::RequestingArm
        } else {
            Phase::Engaged
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    SetMode,
    Arm,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::SetMode => f.write_str("set_mode"),
            RequestKind::Arm => f.write_str("arm"),
        }
    }
}

/// A remote call made during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub kind: RequestKind,
    pub accepted: bool,
}

#[derive(Debug)]
pub struct OffboardController {
    mode: String,
    cooldown: Duration,
    climb_m: f64,
    /// Monotonic, from `Clock::elapsed`.
    last_request: Option<Duration>,
}

impl OffboardController {
    pub fn new(mode: impl Into<String>, cooldown: Duration, climb_m: f64) -> Self {
        Self { mode: mode.into(), cooldown, climb_m, last_request: None }
    }

    /// Start the cooldown clock. The first request goes out one cooldown later.
    pub fn start(&mut self, now: Duration) {
        self.last_request = Some(now);
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    fn due(&self, now: Duration) -> bool {
        match self.last_request {
            Some(t) => now.saturating_sub(t) >= self.cooldown,
            None => true,
        }
    }

    /// One controller step. At most one remote call is made, and only when the
    /// cooldown has run out; the timer restarts whatever the outcome.
    pub async fn tick<L, C>(
        &mut self,
        link: &mut L,
        clock: &C,
        state: &VehicleState,
        last_pose: Option<&Pose>,
        target: &mut TargetPose,
    ) -> Option<Attempt>
    where
        L: FlightLink + ?Sized,
        C: Clock + ?Sized,
    {
        let kind = match Phase::of(state, &self.mode) {
            Phase::Engaged => return None,
            Phase::RequestingMode => RequestKind::SetMode,
            Phase::RequestingArm => RequestKind::Arm,
        };
        if !self.due(clock.elapsed()) {
            return None;
        }

        let reply = match kind {
            RequestKind::SetMode => link.set_mode(&self.mode).await,
            RequestKind::Arm => link.arm(true).await,
        };
        self.last_request = Some(clock.elapsed());

        let accepted = match reply {
            Ok(true) => {
                match kind {
                    RequestKind::SetMode => info!("{} enabled", self.mode.to_lowercase()),
                    RequestKind::Arm => info!("vehicle armed"),
                }
                self.retarget(last_pose, target);
                true
            }
            Ok(false) => {
                warn!("{} refused by autopilot, retry in {:?}", kind, self.cooldown);
                false
            }
            Err(e) => {
                warn!("{} failed: {}, retry in {:?}", kind, e, self.cooldown);
                false
            }
        };
        Some(Attempt { kind, accepted })
    }

    fn retarget(&self, last_pose: Option<&Pose>, target: &mut TargetPose) {
        let Some(pose) = last_pose else {
            warn!("no vehicle pose received yet, keeping current target");
            return;
        };
        target.pose = pose.raised(self.climb_m);
        let p = &target.pose.position;
        let q = &target.pose.orientation;
        info!(
            "set target pose: position=({:.3}, {:.3}, {:.3}) orientation=({:.3}, {:.3}, {:.3}, {:.3})",
            p.x, p.y, p.z, q.x, q.y, q.z, q.w
        );
    }
}
