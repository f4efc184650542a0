use derive_more::{Display, Error, From};
use htx_errors::HtxError;

/// Errors surfaced by the transport layer: connecting, accepting, and the
/// TLS handshake wrapped around either side.
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum TransportError {
    #[display("{_0}")]
    Io(std::io::Error),

    #[display("connect timed out")]
    ConnectTimedOut,

    #[display("host not found: {_0}")]
    HostNotFound(String),

    #[display("TLS handshake failed: {_0}")]
    TlsHandshake(String),

    #[display("listener bind failed after exhausting retry attempts")]
    BindExhausted,

    #[display("invalid certificate or private key PEM")]
    InvalidPem,
}

impl From<TransportError> for HtxError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Io(e) => HtxError::Io(e),
            TransportError::ConnectTimedOut => HtxError::Timeout,
            TransportError::TlsHandshake(msg) => HtxError::Tls(htx_errors::TlsError::Handshake(msg)),
            other => HtxError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
