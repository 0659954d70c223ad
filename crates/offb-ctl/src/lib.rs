pub mod clock;
pub mod controller;
pub mod doctor;
pub mod link;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Attempt, OffboardController, Phase, RequestKind};
pub use link::{FlightLink, LinkError};
pub use session::{RunReport, Session, SessionConfig};
