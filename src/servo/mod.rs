// Servo board link for the hexapod
//
// Provides:
// - The 44-byte "set 18 angles" frame codec
// - Serial connector abstraction (real port or in-memory sink)
// - Single-slot mailbox and the periodic transmit loop

mod link;
mod mailbox;
pub mod port;
pub mod protocol;

pub use link::{LinkConfig, ServoCommander, ServoLink};
pub use mailbox::Mailbox;
pub use port::{Connector, FrameSink, SerialConnector};
pub use protocol::{FrameError, ServoError, ServoFrame, crc16_ibm, degrees_to_fixed};
