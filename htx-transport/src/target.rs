//! Connection targets: an unresolved `(host, port)` or UNIX path, and the
//! resolved address it turns into before the actual `connect()`.
//!
//! Grounded in `gel-stream`'s `Target`/`ResolvedTarget` split, simplified:
//! this crate resolves host names via `tokio::net::lookup_host` (the OS
//! resolver through Tokio) rather than pulling in an async DNS resolver
//! crate, since the outer spec explicitly treats "a DNS resolver beyond
//! delegating to the platform" as a non-goal.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Result, TransportError};

/// Where to connect, before DNS resolution.
#[derive(Clone, Debug)]
pub enum Target {
    /// `host:port`, optionally wrapped in TLS.
    Tcp {
        host: String,
        port: u16,
        tls: Option<TlsTarget>,
    },
    /// A UNIX-domain socket path.
    Unix { path: PathBuf },
}

/// Client-side TLS parameters for a single connection attempt.
#[derive(Clone, Debug, Default)]
pub struct TlsTarget {
    /// Server name to present via SNI; defaults to the target's `host`.
    pub sni_override: Option<String>,
    /// Skip certificate verification entirely (the spec's `verify_ssl=false`).
    pub insecure: bool,
}

impl Target {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Target::Tcp {
            host: host.into(),
            port,
            tls: None,
        }
    }

    pub fn tcp_tls(host: impl Into<String>, port: u16, tls: TlsTarget) -> Self {
        Target::Tcp {
            host: host.into(),
            port,
            tls: Some(tls),
        }
    }

    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Target::Unix { path: path.into() }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Target::Tcp { tls: Some(_), .. })
    }

    pub fn tls_params(&self) -> Option<&TlsTarget> {
        match self {
            Target::Tcp { tls, .. } => tls.as_ref(),
            Target::Unix { .. } => None,
        }
    }

    pub fn sni_name(&self) -> Option<&str> {
        match self {
            Target::Tcp { host, tls, .. } => tls
                .as_ref()
                .and_then(|t| t.sni_override.as_deref())
                .or(Some(host.as_str())),
            Target::Unix { .. } => None,
        }
    }

    /// Resolve this target to a concrete address. Host resolution failure is
    /// reported as [`TransportError::HostNotFound`] so callers can abort
    /// connect retries early per the client connection's retry policy.
    pub async fn resolve(&self) -> Result<ResolvedTarget> {
        match self {
            Target::Tcp { host, port, .. } => {
                let addr = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|_| TransportError::HostNotFound(host.clone()))?
                    .next()
                    .ok_or_else(|| TransportError::HostNotFound(host.clone()))?;
                Ok(ResolvedTarget::Tcp(addr))
            }
            Target::Unix { path } => Ok(ResolvedTarget::Unix(path.clone())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port, tls } => {
                write!(f, "{}://{host}:{port}", if tls.is_some() { "https" } else { "http" })
            }
            Target::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A target after DNS/path resolution — what actually gets connected to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResolvedTarget {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl ResolvedTarget {
    pub fn is_tcp(&self) -> bool {
        matches!(self, ResolvedTarget::Tcp(_))
    }
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedTarget::Tcp(addr) => write!(f, "{addr}"),
            ResolvedTarget::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

#[cfg(unix)]
pub(crate) fn unix_tokio_addr_to_path(addr: &tokio::net::unix::SocketAddr) -> PathBuf {
    addr.as_pathname().map(Into::into).unwrap_or_default()
}
