pub mod decode;
pub mod doctor;
pub mod frame;
pub mod mav;
pub mod px4;

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcConfig {
    /// MAVLink connection string, e.g. "udpin:0.0.0.0:14540" or "serial:/dev/ttyACM0:921600"
    pub url: String,

    /// MAVLink ids we use (companion side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (autopilot side)
    pub target_sys: u8,
    pub target_comp: u8,

    /// Companion heartbeat rate. Default 1 Hz.
    pub send_heartbeat_hz: Option<f32>,

    /// Autopilot silent this long counts as disconnected. Default 3 s.
    pub heartbeat_timeout_ms: Option<u64>,

    /// Wait for COMMAND_ACK. Keep well under the 500 ms offboard loss timeout.
    pub ack_timeout_ms: Option<u64>,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            url: "udpin:0.0.0.0:14540".into(),
            sys_id: 1,
            comp_id: 191,
            target_sys: 1,
            target_comp: 1,
            send_heartbeat_hz: None,
            heartbeat_timeout_ms: None,
            ack_timeout_ms: None,
        }
    }
}

impl FcConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.send_heartbeat_hz.unwrap_or(1.0).max(0.2))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms.unwrap_or(3000))
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms.unwrap_or(200))
    }
}
