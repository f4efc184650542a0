//! Shared error leaves for the `htx` crates.
//!
//! Every crate in the workspace wraps [`HtxError`] into its own
//! `#[non_exhaustive]` enum rather than passing it around directly, but the
//! leaves here (I/O, TLS, timeout, protocol violation, cancellation) are
//! common enough to live in one place so `#[from]` conversions don't need to
//! be repeated crate by crate.

use derive_more::{Display, Error, From};

/// The common error surface shared by every `htx` crate.
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum HtxError {
    #[display("I/O error: {_0}")]
    Io(std::io::Error),

    #[display("TLS error: {_0}")]
    Tls(TlsError),

    #[display("malformed data: {_0}")]
    Parse(ParseError),

    #[display("operation timed out")]
    Timeout,

    #[display("operation cancelled")]
    Cancelled,

    #[display("protocol violation: {_0}")]
    Protocol(String),
}

/// TLS-specific failures, kept distinct from generic I/O so callers can
/// tell "the peer reset the connection" from "the certificate didn't
/// validate".
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum TlsError {
    #[display("handshake failed: {_0}")]
    Handshake(String),

    #[display("invalid certificate for name")]
    InvalidCertificateForName,

    #[display("certificate expired")]
    CertificateExpired,

    #[display("invalid private key or certificate PEM")]
    InvalidPem,

    #[display("no certificate available and self-signed fallback generation failed: {_0}")]
    SelfSignedGenerationFailed(String),
}

/// Parse failures shared by the request and response parsers, and by the
/// WebSocket frame decoder.
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum ParseError {
    #[display("malformed HTTP head")]
    MalformedHead,

    #[display("header block exceeds the configured limit")]
    HeadersTooLarge,

    #[display("body exceeds the configured limit")]
    BodyTooLarge,

    #[display("invalid chunk framing")]
    InvalidChunkFraming,

    #[display("invalid UTF-8 in a WebSocket text frame")]
    InvalidUtf8,
}

/// Convenience alias used throughout the workspace.
pub type Result<T, E = HtxError> = std::result::Result<T, E>;
