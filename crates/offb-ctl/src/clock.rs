use offb_proto::Stamp;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Wall time for stamping, monotonic time for measuring intervals.
pub trait Clock {
    fn now(&self) -> Stamp;

    /// Time since the clock was created. Never goes backwards.
    fn elapsed(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Stamp {
        Stamp::now()
    }

    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Debug, Default)]
struct Times {
    wall: Stamp,
    mono: Duration,
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    times: Arc<Mutex<Times>>,
}

impl ManualClock {
    pub fn new(start: Stamp) -> Self {
        Self { times: Arc::new(Mutex::new(Times { wall: start, mono: Duration::ZERO })) }
    }

    /// Step the wall clock only, like an NTP correction.
    pub fn set(&self, t: Stamp) {
        self.times.lock().unwrap_or_else(|e| e.into_inner()).wall = t;
    }

    pub fn advance(&self, d: Duration) {
        let mut times = self.times.lock().unwrap_or_else(|e| e.into_inner());
        times.wall = times.wall + d;
        times.mono += d;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Stamp {
        self.times.lock().unwrap_or_else(|e| e.into_inner()).wall
    }

    fn elapsed(&self) -> Duration {
        self.times.lock().unwrap_or_else(|e| e.into_inner()).mono
    }
}
