#![doc = "WLED controller sessions: JSON payloads, transports, and the heartbeat state machine."]

pub mod protocol;
pub mod session;
pub mod transport;

pub use protocol::*;
pub use session::*;
pub use transport::*;
