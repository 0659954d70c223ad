use anyhow::{Context, Result};
use async_trait::async_trait;
use mavlink::{
    common::{
        MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavResult, MavState, MavType,
        PositionTargetTypemask, COMMAND_LONG_DATA, HEARTBEAT_DATA, SET_POSITION_TARGET_LOCAL_NED_DATA,
    },
    MavConnection, MavHeader,
};
use offb_ctl::{FlightLink, LinkError};
use offb_proto::{Inbound, Stamp, TargetPose};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use crate::decode::Decoder;
use crate::{frame, px4, FcConfig};

const INBOX_DEPTH: usize = 256;

type Conn = Arc<Box<dyn MavConnection<MavMessage> + Send + Sync>>;

/// A received message with the wall and monotonic time it came off the wire.
type Frame = (Stamp, Instant, MavHeader, MavMessage);

/// Position-only setpoint: velocity, acceleration and yaw rate ignored.
fn position_only() -> PositionTargetTypemask {
    PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE
}

/// MAVLink side of the offboard loop, talking to a PX4 autopilot.
pub struct FcLink {
    conn: Conn,
    rx: mpsc::Receiver<Frame>,
    hdr: MavHeader,
    target_sys: u8,
    target_comp: u8,
    decoder: Decoder,
    pending: VecDeque<Inbound>,
    hb_interval: Duration,
    last_hb_send: Option<Instant>,
    ack_timeout: Duration,
    opened: Instant,
}

impl FcLink {
    pub fn open(cfg: &FcConfig) -> Result<Self> {
        if let Some(rest) = cfg.url.strip_prefix("serial:") {
            // quick validate device
            let (dev, baud) = rest.rsplit_once(':').context("serial url must be serial:<dev>:<baud>")?;
            let baud: u32 = baud.parse().with_context(|| format!("bad baud rate {}", baud))?;
            let _ = tokio_serial::new(dev, baud)
                .open_native_async()
                .with_context(|| format!("open fc serial device {}", dev))?;
        }

        let conn: Conn = Arc::new(
            mavlink::connect::<MavMessage>(&cfg.url).with_context(|| format!("mavlink connect {}", cfg.url))?,
        );

        // mavlink recv blocks, so it gets its own thread; decoding stays on the loop.
        let (tx, rx) = mpsc::channel(INBOX_DEPTH);
        let reader = conn.clone();
        std::thread::Builder::new()
            .name("mav-reader".into())
            .spawn(move || loop {
                match reader.recv() {
                    Ok((hdr, msg)) => {
                        // stamp here, the loop may drain much later
                        if tx.blocking_send((Stamp::now(), Instant::now(), hdr, msg)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        trace!("mavlink recv: {:?}", e);
                        std::thread::sleep(Duration::from_millis(10));
                    }
                }
            })
            .context("spawn mavlink reader")?;

        info!("mavlink link open on {}", cfg.url);
        Ok(Self {
            conn,
            rx,
            hdr: MavHeader { system_id: cfg.sys_id, component_id: cfg.comp_id, sequence: 0 },
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            decoder: Decoder::new(cfg.target_sys, cfg.heartbeat_timeout()),
            pending: VecDeque::new(),
            hb_interval: cfg.heartbeat_interval(),
            last_hb_send: None,
            ack_timeout: cfg.ack_timeout(),
            opened: Instant::now(),
        })
    }

    pub fn send_heartbeat(&mut self) -> Result<(), LinkError> {
        let hb = HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        };
        self.send(MavMessage::HEARTBEAT(hb))
    }

    fn heartbeat_if_due(&mut self) {
        let due = self.last_hb_send.map_or(true, |t| t.elapsed() >= self.hb_interval);
        if !due { return; }
        if let Err(e) = self.send_heartbeat() {
            warn!("companion heartbeat: {}", e);
        }
        self.last_hb_send = Some(Instant::now());
    }

    fn send(&mut self, msg: MavMessage) -> Result<(), LinkError> {
        self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
        self.conn
            .send(&self.hdr, &msg)
            .map_err(|e| LinkError::Send(e.to_string()))?;
        Ok(())
    }

    /// COMMAND_LONG, then wait for its ack. Traffic that arrives meanwhile is
    /// decoded and queued for the next `try_next`.
    async fn command(&mut self, command: MavCmd, params: [f32; 7]) -> Result<bool, LinkError> {
        let cmd = COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        };
        debug!("FC: sending {:?}", command);
        self.send(MavMessage::COMMAND_LONG(cmd))?;

        let deadline = tokio::time::Instant::now() + self.ack_timeout;
        loop {
            let (stamp, at, hdr, msg) = match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) => return Err(LinkError::Timeout(self.ack_timeout)),
                Ok(None) => return Err(LinkError::Closed),
                Ok(Some(frame)) => frame,
            };
            if let MavMessage::COMMAND_ACK(ack) = &msg {
                if ack.command == command && hdr.system_id == self.target_sys {
                    match ack.result {
                        MavResult::MAV_RESULT_IN_PROGRESS => continue,
                        MavResult::MAV_RESULT_ACCEPTED => return Ok(true),
                        other => {
                            debug!("FC: {:?} answered {:?}", command, other);
                            return Ok(false);
                        }
                    }
                }
            }
            if let Some(m) = self.decoder.decode(&hdr, &msg, at, stamp) {
                self.pending.push_back(m);
            }
        }
    }
}

#[async_trait]
impl FlightLink for FcLink {
    fn try_next(&mut self) -> Option<Inbound> {
        self.heartbeat_if_due();
        if let Some(m) = self.pending.pop_front() {
            return Some(m);
        }
        loop {
            match self.rx.try_recv() {
                Ok((stamp, at, hdr, msg)) => {
                    if let Some(m) = self.decoder.decode(&hdr, &msg, at, stamp) {
                        return Some(m);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return self.decoder.check_timeout(Instant::now());
                }
            }
        }
    }

    fn publish_setpoint(&mut self, target: &TargetPose) -> Result<(), LinkError> {
        let (x, y, z) = frame::position_enu_to_ned(&target.pose.position);
        let sp = SET_POSITION_TARGET_LOCAL_NED_DATA {
            time_boot_ms: self.opened.elapsed().as_millis() as u32,
            target_system: self.target_sys,
            target_component: self.target_comp,
            coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
            type_mask: position_only(),
            x: x as f32,
            y: y as f32,
            z: z as f32,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            afx: 0.0,
            afy: 0.0,
            afz: 0.0,
            yaw: frame::yaw_enu_to_ned(&target.pose.orientation) as f32,
            yaw_rate: 0.0,
        };
        trace!("FC: setpoint seq={} ned=({:.3}, {:.3}, {:.3})", target.seq, x, y, z);
        self.send(MavMessage::SET_POSITION_TARGET_LOCAL_NED(sp))
    }

    async fn set_mode(&mut self, mode: &str) -> Result<bool, LinkError> {
        let (main, sub) = px4::mode_ids(mode).ok_or_else(|| LinkError::Rejected(format!("unknown PX4 mode {}", mode)))?;
        let custom = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        info!("FC: requesting mode {}", mode);
        self.command(MavCmd::MAV_CMD_DO_SET_MODE, [custom, main as f32, sub as f32, 0.0, 0.0, 0.0, 0.0])
            .await
    }

    async fn arm(&mut self, value: bool) -> Result<bool, LinkError> {
        info!("FC: requesting {}", if value { "arm" } else { "disarm" });
        let p1 = if value { 1.0 } else { 0.0 };
        self.command(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [p1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{COMMAND_ACK_DATA, LOCAL_POSITION_NED_DATA};
    use offb_proto::{Point, Pose, Quaternion};
    use std::thread::JoinHandle;

    type Peer = Box<dyn MavConnection<MavMessage> + Send + Sync>;

    fn hdr(system_id: u8) -> MavHeader {
        MavHeader { system_id, component_id: 1, sequence: 0 }
    }

    fn local_position(x: f32) -> MavMessage {
        MavMessage::LOCAL_POSITION_NED(LOCAL_POSITION_NED_DATA { x, ..Default::default() })
    }

    fn ack(command: MavCmd, result: MavResult) -> MavMessage {
        MavMessage::COMMAND_ACK(COMMAND_ACK_DATA { command, result, ..Default::default() })
    }

    async fn next_within(link: &mut FcLink, wait: Duration) -> Option<Inbound> {
        let deadline = tokio::time::Instant::now() + wait;
        while tokio::time::Instant::now() < deadline {
            if let Some(m) = link.try_next() {
                return Some(m);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        None
    }

    /// Link on a loopback port plus an autopilot stand-in talking to it. The
    /// stand-in heartbeats first so the link learns where to reply.
    async fn pair(port: u16, ack_ms: u64) -> (FcLink, Peer) {
        let cfg = FcConfig {
            url: format!("udpin:127.0.0.1:{}", port),
            ack_timeout_ms: Some(ack_ms),
            ..FcConfig::default()
        };
        let mut link = FcLink::open(&cfg).unwrap();
        let peer: Peer = mavlink::connect(&format!("udpout:127.0.0.1:{}", port)).unwrap();

        let hb = HEARTBEAT_DATA {
            custom_mode: px4::custom_mode(1, 0),
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: 3,
        };
        peer.send(&hdr(1), &MavMessage::HEARTBEAT(hb)).unwrap();
        match next_within(&mut link, Duration::from_secs(2)).await {
            Some(Inbound::State(s)) => assert!(s.connected),
            other => panic!("expected autopilot state, got {:?}", other),
        }
        (link, peer)
    }

    /// Wait on the peer for the first message `pick` accepts, send `replies`
    /// (system id, message) and hand the picked message back.
    fn respond(
        peer: Peer,
        pick: fn(&MavMessage) -> bool,
        replies: Vec<(u8, MavMessage)>,
    ) -> JoinHandle<MavMessage> {
        std::thread::spawn(move || loop {
            let Ok((_, msg)) = peer.recv() else { continue };
            if pick(&msg) {
                for (sys, reply) in &replies {
                    peer.send(&hdr(*sys), reply).unwrap();
                }
                return msg;
            }
        })
    }

    fn is_command(m: &MavMessage) -> bool {
        matches!(m, MavMessage::COMMAND_LONG(_))
    }

    #[test]
    fn test_position_only_mask_keeps_position_and_yaw() {
        let m = position_only();
        assert!(!m.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_X_IGNORE));
        assert!(!m.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_Z_IGNORE));
        assert!(!m.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_IGNORE));
        assert!(m.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VZ_IGNORE));
        assert!(m.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE));
    }

    #[tokio::test]
    async fn test_open_rejects_bad_serial_url() {
        let cfg = FcConfig { url: "serial:/dev/ttyACM0".into(), ..FcConfig::default() };
        assert!(FcLink::open(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_pose_stamped_on_arrival_not_on_drain() {
        let (mut link, peer) = pair(14771, 200).await;
        for i in 0..5 {
            peer.send(&hdr(1), &local_position(i as f32)).unwrap();
            std::thread::sleep(Duration::from_millis(20));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut stamps = Vec::new();
        while let Some(m) = link.try_next() {
            if let Inbound::VehiclePose(s) = m {
                stamps.push(s.stamp);
            }
        }
        assert_eq!(stamps.len(), 5);
        let spread = stamps[4].since(stamps[0]);
        assert!(spread >= Duration::from_millis(60), "spread = {:?}", spread);
    }

    #[tokio::test]
    async fn test_set_mode_accepted_keeps_traffic_from_the_wait() {
        let (mut link, peer) = pair(14772, 1000).await;
        let replies = vec![
            (1, local_position(4.0)),
            (1, ack(MavCmd::MAV_CMD_DO_SET_MODE, MavResult::MAV_RESULT_ACCEPTED)),
        ];
        let peer = respond(peer, is_command, replies);

        assert!(matches!(link.set_mode("OFFBOARD").await, Ok(true)));
        let MavMessage::COMMAND_LONG(cmd) = peer.join().unwrap() else { unreachable!() };
        assert_eq!(cmd.command, MavCmd::MAV_CMD_DO_SET_MODE);
        assert_eq!(cmd.target_system, 1);
        assert_eq!(cmd.param1, MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32);
        assert_eq!((cmd.param2, cmd.param3), (6.0, 0.0));

        // the pose that arrived before the ack comes out next, in ENU
        match link.try_next() {
            Some(Inbound::VehiclePose(s)) => assert_eq!(s.pose.position.y, 4.0),
            other => panic!("queued pose lost: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ack_waits_past_progress_and_foreign_acks() {
        let (mut link, peer) = pair(14773, 1000).await;
        let replies = vec![
            (1, ack(MavCmd::MAV_CMD_DO_SET_MODE, MavResult::MAV_RESULT_ACCEPTED)),
            (2, ack(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, MavResult::MAV_RESULT_ACCEPTED)),
            (1, ack(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, MavResult::MAV_RESULT_IN_PROGRESS)),
            (1, ack(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, MavResult::MAV_RESULT_TEMPORARILY_REJECTED)),
        ];
        let peer = respond(peer, is_command, replies);

        assert!(matches!(link.arm(true).await, Ok(false)));
        let MavMessage::COMMAND_LONG(cmd) = peer.join().unwrap() else { unreachable!() };
        assert_eq!(cmd.command, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM);
        assert_eq!(cmd.param1, 1.0);
    }

    #[tokio::test]
    async fn test_no_ack_times_out() {
        let (mut link, peer) = pair(14774, 100).await;
        let peer = respond(peer, is_command, Vec::new());

        match link.arm(false).await {
            Err(LinkError::Timeout(d)) => assert_eq!(d, Duration::from_millis(100)),
            other => panic!("expected timeout, got {:?}", other),
        }
        let MavMessage::COMMAND_LONG(cmd) = peer.join().unwrap() else { unreachable!() };
        assert_eq!(cmd.param1, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_mode_rejected_before_sending() {
        let cfg = FcConfig { url: "udpin:127.0.0.1:14775".into(), ..FcConfig::default() };
        let mut link = FcLink::open(&cfg).unwrap();
        let seq = link.hdr.sequence;
        assert!(matches!(link.set_mode("HOVER").await, Err(LinkError::Rejected(_))));
        assert_eq!(link.hdr.sequence, seq);
    }

    #[tokio::test]
    async fn test_setpoint_sent_in_ned_with_ned_yaw() {
        let (mut link, peer) = pair(14776, 200).await;
        let peer = respond(peer, |m| matches!(m, MavMessage::SET_POSITION_TARGET_LOCAL_NED(_)), Vec::new());

        let mut target = TargetPose::neutral(Stamp::new(0, 0));
        target.pose = Pose {
            position: Point { x: 1.0, y: 2.0, z: 3.0 },
            orientation: Quaternion::IDENTITY,
        };
        link.publish_setpoint(&target).unwrap();

        let MavMessage::SET_POSITION_TARGET_LOCAL_NED(sp) = peer.join().unwrap() else { unreachable!() };
        assert_eq!((sp.x, sp.y, sp.z), (2.0, 1.0, -3.0));
        assert_eq!(sp.coordinate_frame, MavFrame::MAV_FRAME_LOCAL_NED);
        assert_eq!(sp.type_mask, position_only());
        // facing east in ENU is a heading of 90 degrees
        assert!((sp.yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-5, "yaw = {}", sp.yaw);
    }
}
