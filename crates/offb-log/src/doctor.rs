use anyhow::Result;
use std::path::Path;

pub fn check_log_dir(dir: &str, vehicle_prefix: &str, vision_prefix: &str) -> Result<()> {
    let p = Path::new(dir);
    if p.exists() {
        anyhow::ensure!(p.is_dir(), "log.dir is not a dir: {}", dir);
    }
    anyhow::ensure!(vehicle_prefix != vision_prefix, "log.vehicle_prefix and log.vision_prefix must differ");
    anyhow::ensure!(
        !vehicle_prefix.contains('/') && !vision_prefix.contains('/'),
        "log prefixes must not contain '/'"
    );
    Ok(())
}
