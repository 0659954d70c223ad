use anyhow::Result;

use crate::session::SessionConfig;

const MAX_COOLDOWN_S: f64 = 600.0;

pub fn check_session(cfg: &SessionConfig) -> Result<()> {
    anyhow::ensure!(cfg.rate_hz.is_finite() && cfg.rate_hz >= 20.0, "offboard.rate_hz must be >= 20");
    anyhow::ensure!(cfg.warmup_setpoints >= 1, "offboard.warmup_setpoints must be >= 1");
    anyhow::ensure!(
        cfg.cooldown_s > 0.0 && cfg.cooldown_s <= MAX_COOLDOWN_S,
        "offboard.cooldown_s must be in (0, {}]",
        MAX_COOLDOWN_S
    );
    anyhow::ensure!(cfg.climb_m.is_finite(), "offboard.climb_m must be finite");
    anyhow::ensure!(!cfg.mode.trim().is_empty(), "offboard.mode missing");
    Ok(())
}
