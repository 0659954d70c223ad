use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use offb_ctl::{Clock, Session, SessionConfig, SystemClock};
use offb_fc::mav::FcLink;
use offb_fc::FcConfig;
use offb_log::record::read_log;
use offb_log::trajectory::{self, Summary};
use offb_log::{log_file_name, PoseLog};

#[derive(Debug, Parser)]
#[command(name = "offb", version, about = "offb - PX4 offboard hover with pose logging")]
struct Cli {
    /// TOML config; built-in defaults when omitted.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Engage offboard, hover and log poses until Ctrl-C (default).
    Run,
    /// Check the configuration without touching the vehicle.
    Doctor,
    /// Compare a camera pose log against a vehicle pose log.
    Trajectory {
        #[arg(long)]
        camera: String,
        #[arg(long)]
        vehicle: String,
        /// Max time gap for pairing samples, seconds.
        #[arg(long, default_value_t = 0.05)]
        max_dt: f64,
        /// Write aligned pairs here for plotting.
        #[arg(long)]
        csv: Option<String>,
    },
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    fc: FcConfig,
    offboard: SessionConfig,
    log: LogCfg,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct LogCfg {
    dir: String,
    vehicle_prefix: String,
    vision_prefix: String,
}

impl Default for LogCfg {
    fn default() -> Self {
        Self { dir: ".".into(), vehicle_prefix: "mav-".into(), vision_prefix: "camera-".into() }
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    toml::from_str(&s).context("parse config toml")
}

// Single-threaded: the loop, handlers and remote calls interleave only at
// tick boundaries.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    match cli.cmd.unwrap_or(Command::Run) {
        Command::Run => run(&cfg).await?,
        Command::Doctor => doctor(&cfg)?,
        Command::Trajectory { camera, vehicle, max_dt, csv } => {
            trajectory_cmd(&camera, &vehicle, max_dt, csv.as_deref())?
        }
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    offb_ctl::doctor::check_session(&cfg.offboard)?;
    offb_fc::doctor::check_link(&cfg.fc, cfg.offboard.period())?;
    offb_log::doctor::check_log_dir(&cfg.log.dir, &cfg.log.vehicle_prefix, &cfg.log.vision_prefix)?;
    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    doctor(cfg)?;

    // name the logs before the link spawns its reader thread
    let named_at = offb_log::local_now();
    let clock = SystemClock::new();
    let start = clock.now();

    std::fs::create_dir_all(&cfg.log.dir).with_context(|| format!("create log dir {}", cfg.log.dir))?;
    let vehicle_path = log_path(&cfg.log.dir, &cfg.log.vehicle_prefix, named_at);
    let vision_path = log_path(&cfg.log.dir, &cfg.log.vision_prefix, named_at);
    let vehicle_log = PoseLog::open(&vehicle_path, start)?;
    info!("saving vehicle pose to {}", vehicle_path.display());
    let vision_log = PoseLog::open(&vision_path, start)?;
    info!("saving vision pose to {}", vision_path.display());

    let link = FcLink::open(&cfg.fc).context("FC open")?;
    let session = Session::new(link, clock, cfg.offboard.clone(), vehicle_log, vision_log);

    let report = session
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler unavailable: {:#}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!(
        "run: done (connected={}, setpoints={}, vehicle={}, vision={})",
        report.connected, report.setpoints, report.vehicle_records, report.vision_records
    );
    Ok(())
}

fn log_path(dir: &str, prefix: &str, at: time::OffsetDateTime) -> PathBuf {
    Path::new(dir).join(log_file_name(prefix, at))
}

fn trajectory_cmd(camera: &str, vehicle: &str, max_dt: f64, csv: Option<&str>) -> Result<()> {
    anyhow::ensure!(max_dt > 0.0, "--max-dt must be > 0");
    let cam = read_log(camera)?;
    let veh = read_log(vehicle)?;

    print_summary("camera", trajectory::summarize(&cam));
    print_summary("vehicle", trajectory::summarize(&veh));

    let cmp = trajectory::compare(&cam, &veh, max_dt);
    println!("pairs={} (max_dt={}s)", cmp.pairs.len(), max_dt);
    if !cmp.pairs.is_empty() {
        let o = cmp.mean_offset;
        println!("mean offset camera-vehicle: x={:.4} y={:.4} z={:.4}", o.x, o.y, o.z);
        println!("position rmse: {:.4} m", cmp.rmse);
    }

    if let Some(path) = csv {
        let f = std::fs::File::create(path).with_context(|| format!("create {}", path))?;
        trajectory::write_pairs(std::io::BufWriter::new(f), &cmp.pairs).context("write pairs")?;
        println!("aligned pairs written to {}", path);
    }
    Ok(())
}

fn print_summary(name: &str, s: Option<Summary>) {
    let Some(s) = s else {
        println!("{}: empty", name);
        return;
    };
    println!("{}: samples={} duration={:.3}s", name, s.samples, s.duration_s);
    for (axis, a) in [("x", s.x), ("y", s.y), ("z", s.z)] {
        println!("  {} min={:.4} max={:.4} mean={:.4}", axis, a.min, a.max, a.mean);
    }
}
