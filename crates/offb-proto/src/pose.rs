use crate::Stamp;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Scalar-last, like the middleware pose messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

impl Pose {
    /// Same pose shifted along z (up, in the local ENU frame).
    pub fn raised(&self, dz: f64) -> Pose {
        let mut p = *self;
        p.position.z += dz;
        p
    }
}

/// A received pose with the device time it was taken at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub stamp: Stamp,
    pub pose: Pose,
}

/// The setpoint streamed to the autopilot.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPose {
    pub seq: u64,
    pub stamp: Stamp,
    pub frame_id: String,
    pub pose: Pose,
}

impl TargetPose {
    pub const FRAME_ID: &'static str = "base_link";

    /// Level pose at the origin.
    pub fn neutral(stamp: Stamp) -> Self {
        Self { seq: 0, stamp, frame_id: Self::FRAME_ID.to_string(), pose: Pose::default() }
    }

    /// Advance the header for the next publish. The pose is left alone.
    pub fn restamp(&mut self, stamp: Stamp) {
        self.seq += 1;
        self.stamp = stamp;
    }
}
