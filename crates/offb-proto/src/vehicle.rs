/// Latest autopilot status. Every state message overwrites the whole value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleState {
    pub connected: bool,
    pub mode: String,
    pub armed: bool,
}

impl VehicleState {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn in_mode(&self, mode: &str) -> bool {
        self.mode == mode
    }
}
