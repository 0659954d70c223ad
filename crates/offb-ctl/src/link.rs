//! Seam between the control loop and the autopilot middleware.

use async_trait::async_trait;
use offb_proto::{Inbound, TargetPose};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("request refused locally: {0}")]
    Rejected(String),
    #[error("no acknowledgement within {0:?}")]
    Timeout(Duration),
    #[error("link closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
}

/// What the loop needs from the autopilot side: an inbox, a setpoint
/// publisher and the two remote calls.
///
/// `set_mode` and `arm` return `Ok(false)` when the autopilot answered and
/// refused, `Err` when no usable answer came back.
#[async_trait]
pub trait FlightLink: Send {
    /// Next pending inbound message. Never blocks.
    fn try_next(&mut self) -> Option<Inbound>;

    fn publish_setpoint(&mut self, target: &TargetPose) -> Result<(), LinkError>;

    async fn set_mode(&mut self, mode: &str) -> Result<bool, LinkError>;

    async fn arm(&mut self, value: bool) -> Result<bool, LinkError>;
}
