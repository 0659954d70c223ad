//! Autopilot frames (local NED, body FRD) to the ENU / FLU frames the pose
//! logs and setpoint logic work in, and back.

use nalgebra::UnitQuaternion;
use offb_proto::{Point, Quaternion};
use std::f64::consts::{FRAC_PI_2, PI};

fn ned_enu() -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(PI, 0.0, FRAC_PI_2)
}

fn frd_flu() -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(PI, 0.0, 0.0)
}

pub fn position_ned_to_enu(x: f64, y: f64, z: f64) -> Point {
    Point { x: y, y: x, z: -z }
}

pub fn position_enu_to_ned(p: &Point) -> (f64, f64, f64) {
    (p.y, p.x, -p.z)
}

/// Scalar-first, as MAVLink sends it.
pub fn from_wxyz(w: f64, x: f64, y: f64, z: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(w, x, y, z))
}

pub fn orientation_ned_to_enu(q: &UnitQuaternion<f64>) -> Quaternion {
    let r = ned_enu() * q * frd_flu();
    Quaternion { x: r.i, y: r.j, z: r.k, w: r.w }
}

pub fn orientation_enu_to_ned(q: &Quaternion) -> UnitQuaternion<f64> {
    let enu = from_wxyz(q.w, q.x, q.y, q.z);
    ned_enu().inverse() * enu * frd_flu().inverse()
}

/// Heading for a NED setpoint from an ENU orientation, in (-pi, pi].
pub fn yaw_enu_to_ned(q: &Quaternion) -> f64 {
    let (_, _, yaw) = orientation_enu_to_ned(q).euler_angles();
    yaw
}
