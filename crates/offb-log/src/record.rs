use anyhow::{Context, Result};
use offb_proto::{Point, Pose, Quaternion};
use std::path::Path;

/// One parsed line of a pose log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseRecord {
    /// Seconds since the recording process started.
    pub t: f64,
    pub pose: Pose,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecordError {
    #[error("line {line}: expected 8 fields, found {found}")]
    FieldCount { line: usize, found: usize },
    #[error("line {line}: field {field} is not a number: {text:?}")]
    NotANumber { line: usize, field: usize, text: String },
}

/// Parse log text. Blank lines and `#` comments are skipped.
pub fn parse_log(text: &str) -> Result<Vec<PoseRecord>, RecordError> {
    let mut out = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') { continue; }
        out.push(parse_line(line, i + 1)?);
    }
    Ok(out)
}

fn parse_line(line: &str, lineno: usize) -> Result<PoseRecord, RecordError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 8 {
        return Err(RecordError::FieldCount { line: lineno, found: fields.len() });
    }
    let mut v = [0f64; 8];
    for (k, f) in fields.iter().enumerate() {
        v[k] = f.parse().map_err(|_| RecordError::NotANumber {
            line: lineno,
            field: k + 1,
            text: f.to_string(),
        })?;
    }
    Ok(PoseRecord {
        t: v[0],
        pose: Pose {
            position: Point { x: v[1], y: v[2], z: v[3] },
            orientation: Quaternion { x: v[4], y: v[5], z: v[6], w: v[7] },
        },
    })
}

pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<PoseRecord>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read pose log {}", path.display()))?;
    parse_log(&text).with_context(|| format!("parse pose log {}", path.display()))
}
