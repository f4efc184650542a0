//! RFC 6455 WebSocket framing, masking, and session liveness.

mod error;
pub mod frame;
pub mod handshake;
pub mod session;

pub use error::{Result, WsError};
pub use frame::Opcode;
pub use session::{Liveness, Role, WsMessage, WsSession};
