use anyhow::Result;
use std::time::Duration;

use crate::FcConfig;

const SCHEMES: &[&str] = &["udpin:", "udpout:", "udpbcast:", "tcpin:", "tcpout:", "serial:"];

/// PX4 leaves offboard when setpoints stop for this long.
const OFFBOARD_LOSS: Duration = Duration::from_millis(500);

pub fn check_link(cfg: &FcConfig, tick: Duration) -> Result<()> {
    anyhow::ensure!(
        SCHEMES.iter().any(|s| cfg.url.starts_with(s)),
        "fc.url has unknown scheme: {}",
        cfg.url
    );
    if let Some(rest) = cfg.url.strip_prefix("serial:") {
        let baud = rest.rsplit_once(':').map(|(_, b)| b).unwrap_or("");
        anyhow::ensure!(baud.parse::<u32>().map(|b| b > 0).unwrap_or(false), "fc.url serial baud invalid");
    }
    anyhow::ensure!(
        (cfg.sys_id, cfg.comp_id) != (cfg.target_sys, cfg.target_comp),
        "fc sys_id/comp_id collide with the target autopilot"
    );
    anyhow::ensure!(cfg.send_heartbeat_hz.unwrap_or(1.0) > 0.0, "fc.send_heartbeat_hz must be > 0");
    anyhow::ensure!(cfg.heartbeat_timeout() > tick, "fc.heartbeat_timeout_ms must exceed one tick");
    anyhow::ensure!(cfg.ack_timeout() < OFFBOARD_LOSS, "fc.ack_timeout_ms must be < 500");
    Ok(())
}
