//! Accept loop (C3): resolves host:port, binds with address reuse, retries
//! on bind/accept failure, applies allow/deny lists, and dispatches the TLS
//! handshake per accepted stream when TLS is enabled.
//!
//! Grounded in `original_source/thinger/asio/tcp_socket_server.cpp`'s retry
//! semantics (5 s bind backoff, 1 s accept backoff) and in
//! `gel-stream::server::acceptor::Acceptor` for the Rust `bind()` /
//! `accept()` split — simplified to handshake one connection at a time
//! rather than `gel-stream`'s `FuturesUnordered`-pipelined backlog, since
//! this spec doesn't call for concurrent-handshake pipelining.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};

use crate::error::{Result, TransportError};
use crate::stream::{Stream, TlsSide};
use crate::target::ResolvedTarget;

const BIND_RETRY_DELAY: Duration = Duration::from_secs(5);
const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// IP allow/deny policy. Empty `allowed` means "all allowed"; `forbidden`
/// always takes precedence over `allowed`.
#[derive(Clone, Debug, Default)]
pub struct RemotePolicy {
    pub allowed: Vec<IpAddr>,
    pub forbidden: Vec<IpAddr>,
}

impl RemotePolicy {
    pub fn is_permitted(&self, ip: IpAddr) -> bool {
        if self.forbidden.contains(&ip) {
            return false;
        }
        self.allowed.is_empty() || self.allowed.contains(&ip)
    }
}

enum Bound {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// An accept loop bound to one address, optionally TLS-terminating.
pub struct Listener {
    bound: Bound,
    policy: RemotePolicy,
    tls: Option<Arc<rustls::ServerConfig>>,
}

impl Listener {
    /// Bind with address-reuse, retrying every 5 seconds on failure up to
    /// `max_attempts` (`-1` = infinite).
    pub async fn bind(
        target: &ResolvedTarget,
        policy: RemotePolicy,
        tls: Option<Arc<rustls::ServerConfig>>,
        max_attempts: i64,
    ) -> Result<Self> {
        let mut attempt: i64 = 0;
        loop {
            match Self::try_bind(target).await {
                Ok(bound) => return Ok(Self { bound, policy, tls }),
                Err(e) => {
                    attempt += 1;
                    if max_attempts >= 0 && attempt >= max_attempts {
                        error!(error = %e, attempt, "exhausted bind attempts");
                        return Err(TransportError::BindExhausted);
                    }
                    warn!(error = %e, attempt, "bind failed, retrying in 5s");
                    tokio::time::sleep(BIND_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn try_bind(target: &ResolvedTarget) -> Result<Bound> {
        match target {
            ResolvedTarget::Tcp(addr) => {
                let socket = match addr {
                    std::net::SocketAddr::V4(_) => tokio::net::TcpSocket::new_v4()?,
                    std::net::SocketAddr::V6(_) => tokio::net::TcpSocket::new_v6()?,
                };
                socket.set_reuseaddr(true)?;
                socket.bind(*addr)?;
                Ok(Bound::Tcp(socket.listen(1024)?))
            }
            #[cfg(unix)]
            ResolvedTarget::Unix(path) => {
                let _ = std::fs::remove_file(path);
                Ok(Bound::Unix(UnixListener::bind(path)?))
            }
            #[cfg(not(unix))]
            ResolvedTarget::Unix(_) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            ))),
        }
    }

    pub fn local_addr(&self) -> Result<ResolvedTarget> {
        match &self.bound {
            Bound::Tcp(l) => Ok(ResolvedTarget::Tcp(l.local_addr()?)),
            #[cfg(unix)]
            Bound::Unix(l) => {
                let addr = l.local_addr()?;
                Ok(ResolvedTarget::Unix(crate::target::unix_tokio_addr_to_path(&addr)))
            }
        }
    }

    /// Accept the next connection, applying the allow/deny policy and the
    /// TLS handshake (if configured). Transient accept failures are retried
    /// after one second; the loop never gives up on its own (the caller
    /// decides when to stop accepting).
    pub async fn accept(&self) -> Result<Stream> {
        loop {
            let raw = match self.accept_one_raw().await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "accept failed, retrying in 1s");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };

            if let Some(ip) = raw.peer_ip() {
                if !self.policy.is_permitted(ip) {
                    info!(%ip, "rejecting connection from disallowed remote");
                    continue;
                }
            }

            return match raw {
                RawAccepted::Tcp(stream) => {
                    if let Some(tls) = &self.tls {
                        match self.handshake_server(stream, tls.clone()).await {
                            Ok(stream) => Ok(stream),
                            Err(e) => {
                                warn!(error = %e, "TLS handshake failed");
                                continue;
                            }
                        }
                    } else {
                        Ok(Stream::Tcp(stream))
                    }
                }
                #[cfg(unix)]
                RawAccepted::Unix(stream) => Ok(Stream::Unix(stream)),
            };
        }
    }

    async fn accept_one_raw(&self) -> Result<RawAccepted> {
        match &self.bound {
            Bound::Tcp(l) => {
                let (stream, _addr) = l.accept().await?;
                Ok(RawAccepted::Tcp(stream))
            }
            #[cfg(unix)]
            Bound::Unix(l) => {
                let (stream, _addr) = l.accept().await?;
                Ok(RawAccepted::Unix(stream))
            }
        }
    }

    async fn handshake_server(
        &self,
        stream: TcpStream,
        tls: Arc<rustls::ServerConfig>,
    ) -> Result<Stream> {
        let acceptor = tokio_rustls::TlsAcceptor::from(tls);
        let stream = acceptor
            .accept(stream)
            .await
            .map_err(|e| TransportError::TlsHandshake(e.to_string()))?;
        Ok(Stream::Tls(Box::new(TlsSide::Server(stream))))
    }
}

enum RawAccepted {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl RawAccepted {
    fn peer_ip(&self) -> Option<IpAddr> {
        match self {
            RawAccepted::Tcp(s) => s.peer_addr().ok().map(|a| a.ip()),
            #[cfg(unix)]
            RawAccepted::Unix(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_takes_precedence_over_allow() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let policy = RemotePolicy {
            allowed: vec![ip],
            forbidden: vec![ip],
        };
        assert!(!policy.is_permitted(ip));
    }

    #[test]
    fn empty_allow_list_permits_all() {
        let policy = RemotePolicy::default();
        assert!(policy.is_permitted("1.2.3.4".parse().unwrap()));
    }
}
