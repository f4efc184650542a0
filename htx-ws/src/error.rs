use derive_more::{Display, Error, From};
use htx_errors::{HtxError, ParseError};

#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum WsError {
    #[display("I/O error: {_0}")]
    Io(std::io::Error),

    #[display("{_0}")]
    Parse(ParseError),

    #[display("reserved bits set in frame header")]
    ReservedBitsSet,

    #[display("unmasked data frame from a client")]
    UnmaskedClientFrame,

    #[display("control frame is fragmented or oversized")]
    InvalidControlFrame,

    #[display("continuation frame without a preceding unfinished message")]
    UnexpectedContinuation,

    #[display("unknown opcode {_0:#x}")]
    UnknownOpcode(u8),

    #[display("peer closed the connection")]
    ConnectionClosed,

    #[display("handshake failed: {_0}")]
    HandshakeFailed(String),
}

impl From<WsError> for HtxError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::Io(e) => HtxError::Io(e),
            WsError::Parse(e) => HtxError::Parse(e),
            WsError::ConnectionClosed => HtxError::Protocol("websocket connection closed".into()),
            other => HtxError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, WsError>;
