//! The uniform stream interface (C2): one concrete enum over TCP, TLS, and
//! UNIX-domain sockets, implementing `tokio::io::{AsyncRead, AsyncWrite}`.
//!
//! Grounded in `gel-stream::common::tokio_stream::TokioStream` for the
//! enum-dispatch shape, and in `gel-stream::common::stream::UpgradableStream`
//! for the idea of a stream that can carry TLS — simplified here to a single
//! concrete `rustls` backend instead of `gel-stream`'s generic `TlsDriver`,
//! since this crate never needs to swap TLS implementations at compile time.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpStream, UnixStream};

use crate::error::{Result, TransportError};
use crate::target::ResolvedTarget;

/// Either side of a TLS connection; kept as one boxed variant of [`Stream`]
/// so the common non-TLS path doesn't pay for the larger `TlsStream` size.
#[derive(derive_io::AsyncRead, derive_io::AsyncWrite)]
pub enum TlsSide {
    Client(tokio_rustls::client::TlsStream<TcpStream>),
    Server(tokio_rustls::server::TlsStream<TcpStream>),
}

impl TlsSide {
    fn inner_io(&self) -> &TcpStream {
        match self {
            TlsSide::Client(s) => s.get_ref().0,
            TlsSide::Server(s) => s.get_ref().0,
        }
    }
}

/// A connected, readable/writable byte stream — TCP, TLS-over-TCP, or a
/// UNIX-domain socket. This is `spec.md`'s "uniform stream interface"
/// (§4.2).
#[derive(derive_io::AsyncRead, derive_io::AsyncWrite)]
pub enum Stream {
    Tcp(TcpStream),
    Tls(Box<TlsSide>),
    Unix(UnixStream),
}

impl Stream {
    pub fn is_secure(&self) -> bool {
        matches!(self, Stream::Tls(_))
    }

    pub fn remote_ip(&self) -> Option<std::net::IpAddr> {
        self.remote_addr().map(|a| a.ip())
    }

    pub fn remote_port(&self) -> Option<u16> {
        self.remote_addr().map(|a| a.port())
    }

    pub fn local_port(&self) -> Option<u16> {
        match self {
            Stream::Tcp(s) => s.local_addr().ok().map(|a| a.port()),
            Stream::Tls(side) => side.inner_io().local_addr().ok().map(|a| a.port()),
            Stream::Unix(_) => None,
        }
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        match self {
            Stream::Tcp(s) => s.peer_addr().ok(),
            Stream::Tls(side) => side.inner_io().peer_addr().ok(),
            Stream::Unix(_) => None,
        }
    }

    /// Connect to `target`, racing a timer as §4.2 requires: whichever of
    /// the connect or the timer resolves first cancels the other.
    pub async fn connect_timeout(target: &ResolvedTarget, timeout: Duration) -> Result<Stream> {
        match tokio::time::timeout(timeout, Self::connect(target)).await {
            Ok(res) => res,
            Err(_) => Err(TransportError::ConnectTimedOut),
        }
    }

    async fn connect(target: &ResolvedTarget) -> Result<Stream> {
        match target {
            ResolvedTarget::Tcp(addr) => Ok(Stream::Tcp(TcpStream::connect(addr).await?)),
            #[cfg(unix)]
            ResolvedTarget::Unix(path) => Ok(Stream::Unix(UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            ResolvedTarget::Unix(_) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            ))),
        }
    }
}
