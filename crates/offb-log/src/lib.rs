pub mod doctor;
pub mod record;
pub mod trajectory;

use anyhow::{Context, Result};
use offb_proto::{PoseSample, Stamp};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use time::OffsetDateTime;
use tracing::warn;

/// `<prefix><Y>-<M>-<D>-<H>-<Min>-<S>.txt`, fields unpadded.
pub fn log_file_name(prefix: &str, at: OffsetDateTime) -> String {
    format!(
        "{}{}-{}-{}-{}-{}-{}.txt",
        prefix,
        at.year(),
        at.month() as u8,
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// Local wall-clock time for naming logs. Falls back to UTC when the offset
/// can't be determined (e.g. other threads already running).
pub fn local_now() -> OffsetDateTime {
    match OffsetDateTime::now_local() {
        Ok(t) => t,
        Err(e) => {
            warn!("local time offset unavailable ({}), naming logs in UTC", e);
            OffsetDateTime::now_utc()
        }
    }
}

/// One record: relative seconds, zero-padded nanos, then position and orientation.
pub fn format_record(sample: &PoseSample, origin_sec: i64) -> String {
    let p = &sample.pose.position;
    let q = &sample.pose.orientation;
    format!(
        "{}.{:09} {:.9} {:.9} {:.9} {:.9} {:.9} {:.9} {:.9}",
        sample.stamp.sec - origin_sec,
        sample.stamp.nsec,
        p.x, p.y, p.z,
        q.x, q.y, q.z, q.w
    )
}

/// Writer a pose log can be closed onto.
pub trait Sink: Write {
    /// Make written records durable.
    fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Sink for File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_all()
    }
}

impl Sink for Vec<u8> {}

/// Append-only pose recorder. Each record is written and flushed on its own.
pub struct PoseLog<W: Write> {
    out: W,
    origin_sec: i64,
    records: u64,
}

impl PoseLog<File> {
    /// Create (or append to) `path`. Existing content is never truncated.
    pub fn open(path: impl AsRef<Path>, origin: Stamp) -> Result<Self> {
        let path = path.as_ref();
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open pose log {}", path.display()))?;
        Ok(Self::new(f, origin))
    }
}

impl<W: Sink> PoseLog<W> {
    /// Flush, sync and close. Returns the number of records written.
    pub fn close(mut self) -> Result<u64> {
        self.out.flush().context("flush pose log")?;
        self.out.sync().context("sync pose log")?;
        Ok(self.records)
    }
}

impl<W: Write> PoseLog<W> {
    /// `origin` is the process start; only its whole seconds are used.
    pub fn new(out: W, origin: Stamp) -> Self {
        Self { out, origin_sec: origin.sec, records: 0 }
    }

    pub fn record(&mut self, sample: &PoseSample) -> std::io::Result<()> {
        let mut line = format_record(sample, self.origin_sec);
        line.push('\n');
        self.out.write_all(line.as_bytes())?;
        self.out.flush()?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush and hand back the writer.
    pub fn into_inner(mut self) -> std::io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
pub(crate) mod testdir {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Fresh directory under the system temp dir.
    pub fn fresh(tag: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("offb-{}-{}-{}", tag, std::process::id(), nanos));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offb_proto::{Point, Pose, Quaternion};
    use time::macros::datetime;

    fn sample(sec: i64, nsec: u32, x: f64) -> PoseSample {
        PoseSample {
            stamp: Stamp::new(sec, nsec),
            pose: Pose {
                position: Point { x, y: 2.0, z: -0.5 },
                orientation: Quaternion { x: 0.0, y: 0.0, z: 0.5, w: 0.8660254037844386 },
            },
        }
    }

    #[test]
    fn test_file_name_unpadded_fields() {
        let at = datetime!(2024-03-07 09:05:02 UTC);
        assert_eq!(log_file_name("mav-", at), "mav-2024-3-7-9-5-2.txt");
        assert_eq!(log_file_name("camera-", at), "camera-2024-3-7-9-5-2.txt");
    }

    #[test]
    fn test_format_record_fixed_precision() {
        let line = format_record(&sample(1_700_000_012, 50_000_000, 1.25), 1_700_000_000);
        assert_eq!(
            line,
            "12.050000000 1.250000000 2.000000000 -0.500000000 0.000000000 0.000000000 0.500000000 0.866025404"
        );
    }

    #[test]
    fn test_record_appends_one_line_per_sample_in_order() {
        let mut log = PoseLog::new(Vec::new(), Stamp::new(100, 999));
        log.record(&sample(101, 0, 1.0)).unwrap();
        log.record(&sample(102, 0, 2.0)).unwrap();
        log.record(&sample(103, 0, 3.0)).unwrap();
        assert_eq!(log.records(), 3);

        let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
        let firsts: Vec<&str> = text.lines().map(|l| l.split(' ').next().unwrap()).collect();
        assert_eq!(firsts, vec!["1.000000000", "2.000000000", "3.000000000"]);
    }

    #[test]
    fn test_open_appends_without_truncating() {
        let dir = testdir::fresh("append");
        let path = dir.join("mav-test.txt");

        let mut log = PoseLog::open(&path, Stamp::new(0, 0)).unwrap();
        log.record(&sample(1, 0, 1.0)).unwrap();
        assert_eq!(log.close().unwrap(), 1);

        let mut log = PoseLog::open(&path, Stamp::new(0, 0)).unwrap();
        log.record(&sample(2, 0, 2.0)).unwrap();
        log.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        std::fs::remove_dir_all(dir).ok();
    }
}
