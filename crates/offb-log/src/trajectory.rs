//! Offline comparison of a camera (vision) log against the vehicle log.

use crate::record::PoseRecord;
use offb_proto::Point;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub samples: usize,
    pub duration_s: f64,
    pub x: AxisStats,
    pub y: AxisStats,
    pub z: AxisStats,
}

/// None for an empty log.
pub fn summarize(recs: &[PoseRecord]) -> Option<Summary> {
    let first = recs.first()?;
    let last = recs.last()?;
    Some(Summary {
        samples: recs.len(),
        duration_s: last.t - first.t,
        x: axis(recs, |p| p.x),
        y: axis(recs, |p| p.y),
        z: axis(recs, |p| p.z),
    })
}

fn axis(recs: &[PoseRecord], f: impl Fn(&Point) -> f64) -> AxisStats {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for r in recs {
        let v = f(&r.pose.position);
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    AxisStats { min, max, mean: sum / recs.len() as f64 }
}

/// Camera sample matched with the vehicle sample nearest in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair {
    pub t: f64,
    pub camera: Point,
    pub vehicle: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub pairs: Vec<Pair>,
    /// Mean of camera minus vehicle, per axis.
    pub mean_offset: Point,
    pub rmse: f64,
}

/// Pair every camera record with the nearest vehicle record no further than
/// `max_dt` seconds away. Both inputs must be in time order, as logged.
pub fn compare(camera: &[PoseRecord], vehicle: &[PoseRecord], max_dt: f64) -> Comparison {
    let mut pairs = Vec::new();
    let mut j = 0;
    for c in camera {
        while j + 1 < vehicle.len() && (vehicle[j + 1].t - c.t).abs() <= (vehicle[j].t - c.t).abs() {
            j += 1;
        }
        let Some(v) = vehicle.get(j) else { break };
        if (v.t - c.t).abs() <= max_dt {
            pairs.push(Pair { t: c.t, camera: c.pose.position, vehicle: v.pose.position });
        }
    }

    let n = pairs.len() as f64;
    let mut off = Point::default();
    let mut sq = 0.0;
    for p in &pairs {
        let (dx, dy, dz) = (p.camera.x - p.vehicle.x, p.camera.y - p.vehicle.y, p.camera.z - p.vehicle.z);
        off.x += dx;
        off.y += dy;
        off.z += dz;
        sq += dx * dx + dy * dy + dz * dz;
    }
    if pairs.is_empty() {
        return Comparison { pairs, mean_offset: off, rmse: 0.0 };
    }
    off.x /= n;
    off.y /= n;
    off.z /= n;
    Comparison { pairs, mean_offset: off, rmse: (sq / n).sqrt() }
}

/// Aligned pairs as whitespace-separated columns, ready for plotting.
pub fn write_pairs<W: Write>(mut out: W, pairs: &[Pair]) -> std::io::Result<()> {
    writeln!(out, "# t cam_x cam_y cam_z veh_x veh_y veh_z")?;
    for p in pairs {
        writeln!(
            out,
            "{:.9} {:.9} {:.9} {:.9} {:.9} {:.9} {:.9}",
            p.t, p.camera.x, p.camera.y, p.camera.z, p.vehicle.x, p.vehicle.y, p.vehicle.z
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use offb_proto::{Pose, Quaternion};

    fn rec(t: f64, x: f64, y: f64, z: f64) -> PoseRecord {
        PoseRecord {
            t,
            pose: Pose { position: Point { x, y, z }, orientation: Quaternion::IDENTITY },
        }
    }

    #[test]
    fn test_summary_per_axis() {
        let recs = vec![rec(1.0, 0.0, 1.0, -1.0), rec(2.0, 2.0, 1.0, 1.0), rec(4.0, 4.0, 1.0, 3.0)];
        let s = summarize(&recs).unwrap();
        assert_eq!(s.samples, 3);
        assert_eq!(s.duration_s, 3.0);
        assert_eq!(s.x, AxisStats { min: 0.0, max: 4.0, mean: 2.0 });
        assert_eq!(s.y.mean, 1.0);
        assert_eq!(s.z.min, -1.0);
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_compare_nearest_within_window() {
        let vehicle = vec![rec(0.0, 0.0, 0.0, 0.0), rec(0.1, 1.0, 0.0, 0.0), rec(0.2, 2.0, 0.0, 0.0)];
        // 0.09 pairs with 0.1, 0.5 is too far from anything
        let camera = vec![rec(0.09, 1.0, 0.0, 0.5), rec(0.5, 9.0, 9.0, 9.0)];
        let c = compare(&camera, &vehicle, 0.05);
        assert_eq!(c.pairs.len(), 1);
        assert_eq!(c.pairs[0].vehicle.x, 1.0);
        assert_eq!(c.mean_offset, Point { x: 0.0, y: 0.0, z: 0.5 });
        assert!((c.rmse - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_compare_empty_vehicle_log() {
        let c = compare(&[rec(0.0, 1.0, 1.0, 1.0)], &[], 1.0);
        assert!(c.pairs.is_empty());
        assert_eq!(c.rmse, 0.0);
    }

    #[test]
    fn test_write_pairs_has_header() {
        let pairs = vec![Pair { t: 1.0, camera: Point { x: 1.0, y: 2.0, z: 3.0 }, vehicle: Point::default() }];
        let mut buf = Vec::new();
        write_pairs(&mut buf, &pairs).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('#'));
        assert!(lines[1].starts_with("1.000000000 1.000000000 2.000000000 3.000000000"));
    }
}
