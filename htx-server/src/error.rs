use derive_more::{Display, Error, From};
use htx_errors::HtxError;

#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum ServerError {
    #[display("I/O error: {_0}")]
    Io(std::io::Error),

    #[display("{_0}")]
    Proto(htx_proto::ProtoError),

    #[display("{_0}")]
    Ws(htx_ws::WsError),

    #[display("response already sent for this request")]
    AlreadyResponded,

    #[display("connection lost before the response could be sent")]
    ConnectionLost,

    #[display("body exceeds the configured limit")]
    BodyTooLarge,

    #[display("not a WebSocket upgrade request")]
    NotAWebSocketUpgrade,

    #[display("unsupported WebSocket protocol")]
    UnsupportedWebSocketProtocol,
}

impl From<ServerError> for HtxError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Io(e) => HtxError::Io(e),
            ServerError::Proto(e) => e.into(),
            ServerError::Ws(e) => e.into(),
            other => HtxError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
