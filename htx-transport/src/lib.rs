//! Transport layer: uniform TCP/TLS/UNIX streams, a retrying listener, a
//! client-side connector, and a per-hostname certificate registry.
//!
//! This is the Rust home of `spec.md`'s C2 (transport sockets), C3
//! (listener), and C4 (certificate registry), grounded throughout in
//! `gel-stream` and in `original_source/thinger/asio`.

mod certs;
mod connector;
mod error;
mod listener;
mod stream;
mod target;

pub use certs::{CertificateRegistry, SniResolver};
pub use connector::Connector;
pub use error::{Result, TransportError};
pub use listener::{Listener, RemotePolicy};
pub use stream::{Stream, TlsSide};
pub use target::{ResolvedTarget, Target, TlsTarget};
