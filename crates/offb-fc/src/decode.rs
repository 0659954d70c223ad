use mavlink::common::{MavAutopilot, MavMessage, MavModeFlag};
use mavlink::MavHeader;
use nalgebra::UnitQuaternion;
use offb_proto::{Inbound, Pose, PoseSample, Stamp, VehicleState};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::{frame, px4};

/// Turns raw MAVLink traffic into the three inbound streams the loop consumes.
#[derive(Debug)]
pub struct Decoder {
    target_sys: u8,
    hb_timeout: Duration,
    last_heartbeat: Option<Instant>,
    state: VehicleState,
    attitude: Option<UnitQuaternion<f64>>,
}

impl Decoder {
    pub fn new(target_sys: u8, hb_timeout: Duration) -> Self {
        Self {
            target_sys,
            hb_timeout,
            last_heartbeat: None,
            state: VehicleState::disconnected(),
            attitude: None,
        }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn decode(&mut self, hdr: &MavHeader, msg: &MavMessage, now: Instant, stamp: Stamp) -> Option<Inbound> {
        let from_target = hdr.system_id == self.target_sys;
        match msg {
            MavMessage::HEARTBEAT(hb) if from_target && hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID => {
                if !self.state.connected {
                    info!("autopilot heartbeat from sys {}", hdr.system_id);
                }
                self.last_heartbeat = Some(now);
                self.state = VehicleState {
                    connected: true,
                    mode: px4::mode_name(hb.base_mode, hb.custom_mode),
                    armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
                };
                Some(Inbound::State(self.state.clone()))
            }
            MavMessage::ATTITUDE_QUATERNION(att) if from_target => {
                self.attitude = Some(frame::from_wxyz(att.q1 as f64, att.q2 as f64, att.q3 as f64, att.q4 as f64));
                None
            }
            MavMessage::LOCAL_POSITION_NED(pos) if from_target => {
                let attitude = self.attitude.unwrap_or_else(UnitQuaternion::identity);
                let pose = Pose {
                    position: frame::position_ned_to_enu(pos.x as f64, pos.y as f64, pos.z as f64),
                    orientation: frame::orientation_ned_to_enu(&attitude),
                };
                Some(Inbound::VehiclePose(PoseSample { stamp, pose }))
            }
            MavMessage::VISION_POSITION_ESTIMATE(v) => {
                let attitude = UnitQuaternion::from_euler_angles(v.roll as f64, v.pitch as f64, v.yaw as f64);
                let pose = Pose {
                    position: frame::position_ned_to_enu(v.x as f64, v.y as f64, v.z as f64),
                    orientation: frame::orientation_ned_to_enu(&attitude),
                };
                Some(Inbound::VisionPose(PoseSample { stamp, pose }))
            }
            MavMessage::COMMAND_ACK(ack) => {
                debug!("unsolicited ack {:?} {:?}", ack.command, ack.result);
                None
            }
            _ => None,
        }
    }

    /// One disconnected state once the autopilot has been silent too long.
    pub fn check_timeout(&mut self, now: Instant) -> Option<Inbound> {
        let last = self.last_heartbeat?;
        if !self.state.connected || now.duration_since(last) < self.hb_timeout {
            return None;
        }
        warn!("no autopilot heartbeat for {:?}", now.duration_since(last));
        self.state.connected = false;
        Some(Inbound::State(self.state.clone()))
    }
}
