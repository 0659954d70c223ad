pub mod pose;
pub mod vehicle;

use std::ops::Add;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use pose::{Point, Pose, PoseSample, Quaternion, TargetPose};
pub use vehicle::VehicleState;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Wall-clock time split the way the autopilot middleware stamps messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    pub sec: i64,
    pub nsec: u32,
}

impl Stamp {
    pub fn new(sec: i64, nsec: u32) -> Self {
        Self {
            sec: sec + (nsec / NANOS_PER_SEC) as i64,
            nsec: nsec % NANOS_PER_SEC,
        }
    }

    pub fn from_duration(d: Duration) -> Self {
        Self { sec: d.as_secs() as i64, nsec: d.subsec_nanos() }
    }

    /// Current system time. Clamps to the epoch if the clock is set before it.
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(Self::from_duration)
            .unwrap_or_default()
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 / NANOS_PER_SEC as f64
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn since(&self, earlier: Stamp) -> Duration {
        if *self <= earlier {
            return Duration::ZERO;
        }
        let (sec, nsec) = if self.nsec >= earlier.nsec {
            (self.sec - earlier.sec, self.nsec - earlier.nsec)
        } else {
            (self.sec - earlier.sec - 1, self.nsec + NANOS_PER_SEC - earlier.nsec)
        };
        Duration::new(sec as u64, nsec)
    }
}

impl Add<Duration> for Stamp {
    type Output = Stamp;

    fn add(self, d: Duration) -> Stamp {
        Stamp::new(self.sec + d.as_secs() as i64, self.nsec + d.subsec_nanos())
    }
}

/// One message taken off the middleware inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    State(VehicleState),
    VehiclePose(PoseSample),
    VisionPose(PoseSample),
}
