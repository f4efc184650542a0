use derive_more::{Display, Error, From};
use htx_errors::{HtxError, ParseError};

/// Errors from parsing or encoding HTTP/1.1 framing.
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum ProtoError {
    #[display("{_0}")]
    Parse(ParseError),

    #[display("failed to decompress body: {_0}")]
    Decompress(String),
}

impl From<ProtoError> for HtxError {
    fn from(err: ProtoError) -> Self {
        match err {
            ProtoError::Parse(e) => HtxError::Parse(e),
            ProtoError::Decompress(msg) => HtxError::Protocol(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
