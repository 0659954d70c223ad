use anyhow::Result;
use offb_log::{PoseLog, Sink};
use offb_proto::{Inbound, Pose, PoseSample, TargetPose, VehicleState};
use serde::Deserialize;
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::controller::{Attempt, OffboardController, Phase};
use crate::link::FlightLink;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Setpoint stream rate. PX4 drops out of offboard below 2 Hz; we keep 20.
    pub rate_hz: f64,
    pub warmup_setpoints: u32,
    pub cooldown_s: f64,
    /// Height added to the last vehicle pose when a mode/arm request succeeds.
    pub climb_m: f64,
    pub mode: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rate_hz: 20.0,
            warmup_setpoints: 100,
            cooldown_s: 5.0,
            climb_m: 0.4,
            mode: "OFFBOARD".into(),
        }
    }
}

impl SessionConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }

    /// Saturates instead of panicking on out-of-range values.
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_s).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub connected: bool,
    pub setpoints: u64,
    pub vehicle_records: u64,
    pub vision_records: u64,
}

/// The whole program state, driven one tick at a time from a single task.
pub struct Session<L, C, W: Write> {
    link: L,
    clock: C,
    cfg: SessionConfig,
    state: VehicleState,
    last_pose: Option<Pose>,
    target: TargetPose,
    controller: OffboardController,
    vehicle_log: PoseLog<W>,
    vision_log: PoseLog<W>,
    setpoints: u64,
}

impl<L, C, W> Session<L, C, W>
where
    L: FlightLink,
    C: Clock,
    W: Write,
{
    pub fn new(link: L, clock: C, cfg: SessionConfig, vehicle_log: PoseLog<W>, vision_log: PoseLog<W>) -> Self {
        let target = TargetPose::neutral(clock.now());
        let controller = OffboardController::new(cfg.mode.clone(), cfg.cooldown(), cfg.climb_m);
        Self {
            link,
            clock,
            cfg,
            state: VehicleState::disconnected(),
            last_pose: None,
            target,
            controller,
            vehicle_log,
            vision_log,
            setpoints: 0,
        }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn target(&self) -> &TargetPose {
        &self.target
    }

    pub fn last_pose(&self) -> Option<&Pose> {
        self.last_pose.as_ref()
    }

    pub fn phase(&self) -> Phase {
        Phase::of(&self.state, self.controller.mode())
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Drain every pending inbound message. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Some(msg) = self.link.try_next() {
            self.handle(msg);
            n += 1;
        }
        n
    }

    fn handle(&mut self, msg: Inbound) {
        match msg {
            Inbound::State(s) => {
                if s != self.state {
                    debug!("vehicle state: connected={} mode={:?} armed={}", s.connected, s.mode, s.armed);
                }
                self.state = s;
            }
            Inbound::VehiclePose(sample) => {
                self.last_pose = Some(sample.pose);
                record(&mut self.vehicle_log, &sample, "vehicle");
            }
            Inbound::VisionPose(sample) => record(&mut self.vision_log, &sample, "vision"),
        }
    }

    fn publish(&mut self) {
        match self.link.publish_setpoint(&self.target) {
            Ok(()) => self.setpoints += 1,
            Err(e) => warn!("setpoint publish failed: {}", e),
        }
    }

    /// Connection gate tick.
    pub fn gate_step(&mut self) -> bool {
        self.pump();
        self.state.connected
    }

    /// Warm-up tick: stream the neutral target unchanged.
    pub fn warmup_step(&mut self) {
        self.pump();
        self.publish();
    }

    pub fn begin_control(&mut self) {
        self.controller.start(self.clock.elapsed());
    }

    /// Control tick: inbox, at most one remote call, one setpoint.
    pub async fn control_step(&mut self) -> Option<Attempt> {
        self.pump();
        let attempt = self
            .controller
            .tick(&mut self.link, &self.clock, &self.state, self.last_pose.as_ref(), &mut self.target)
            .await;
        self.target.restamp(self.clock.now());
        self.publish();
        attempt
    }

    /// Gate, warm-up, then control until `shutdown` resolves. Logs are closed
    /// on every exit path.
    pub async fn run<F>(mut self, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
        W: Sink,
    {
        let mut ticker = tokio::time::interval(self.cfg.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("waiting for flight controller connection");
        let connected = loop {
            tokio::select! {
                _ = &mut shutdown => break false,
                _ = ticker.tick() => {
                    if self.gate_step() { break true; }
                }
            }
        };

        let mut stopped = !connected;
        if connected {
            info!("flight controller connected, streaming {} warm-up setpoints", self.cfg.warmup_setpoints);
            for _ in 0..self.cfg.warmup_setpoints {
                tokio::select! {
                    _ = &mut shutdown => { stopped = true; break; }
                    _ = ticker.tick() => self.warmup_step(),
                }
            }
        }

        if !stopped {
            info!("warm-up done, requesting {}", self.cfg.mode);
            self.begin_control();
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => { self.control_step().await; }
                }
            }
        }

        info!("shutting down");
        self.close(connected)
    }

    fn close(self, connected: bool) -> Result<RunReport>
    where
        W: Sink,
    {
        // both logs get closed before either error is reported
        let vehicle = closed(self.vehicle_log.close(), "vehicle");
        let vision = closed(self.vision_log.close(), "vision");
        Ok(RunReport { connected, setpoints: self.setpoints, vehicle_records: vehicle?, vision_records: vision? })
    }
}

fn closed(res: Result<u64>, which: &str) -> Result<u64> {
    match &res {
        Ok(n) => info!("{} pose saved ({} records)", which, n),
        Err(e) => warn!("{} pose log close failed: {:#}", which, e),
    }
    res
}

fn record<W: Write>(log: &mut PoseLog<W>, sample: &PoseSample, which: &str) {
    if let Err(e) = log.record(sample) {
        warn!("{} pose log write failed: {}", which, e);
    }
}
