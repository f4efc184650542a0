use derive_more::{Display, Error, From};
use htx_errors::HtxError;

#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum ClientError {
    #[display("I/O error: {_0}")]
    Io(std::io::Error),

    #[display("{_0}")]
    Proto(htx_proto::ProtoError),

    #[display("{_0}")]
    Ws(htx_ws::WsError),

    #[display("{_0}")]
    Transport(htx_transport::TransportError),

    #[display("invalid URL: {_0}")]
    InvalidUrl(String),

    #[display("not a WebSocket upgrade response")]
    NotAWebSocketUpgrade,

    #[display("request timed out")]
    Timeout,

    #[display("connection closed before a complete response was received")]
    ConnectionClosed,
}

impl From<ClientError> for HtxError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Io(e) => HtxError::Io(e),
            ClientError::Proto(e) => e.into(),
            ClientError::Ws(e) => e.into(),
            ClientError::Transport(e) => e.into(),
            ClientError::Timeout => HtxError::Timeout,
            other => HtxError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
