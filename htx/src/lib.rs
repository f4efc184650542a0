//! `htx`: an embeddable HTTP/1.1 stack — client, server, and the shared
//! protocol/concurrency engine that connects them over TCP, TLS, and
//! UNIX-domain sockets.
//!
//! This crate is a thin facade: the actual protocol and concurrency
//! engine lives in `htx-transport`, `htx-proto`, `htx-ws`, `htx-pool`,
//! `htx-server`, and `htx-client`. `htx::prelude` re-exports the types
//! most callers need to wire up a server or issue client requests
//! without depending on each sub-crate directly.

pub mod prelude {
    pub use htx_client::{
        Client, ClientConfig, ClientError, ClientUrl, Cookie, CookieStore, Form, Response as ClientResponse,
        RetryPolicy, SyncClient,
    };
    pub use htx_errors::HtxError;
    pub use htx_proto::{Headers, Method};
    pub use htx_pool::{ConnectionPool, PoolKey};
    pub use htx_server::{serve, AuthLevel, Router, ServerConfig, ServerRequest, ServerResponse, SseConfig};
    pub use htx_transport::{
        CertificateRegistry, Connector, Listener, RemotePolicy, ResolvedTarget, SniResolver, Stream, Target,
        TlsTarget,
    };
    pub use htx_ws::{Role, WsMessage, WsSession};
}

pub use htx_client as client;
pub use htx_proto as proto;
pub use htx_pool as pool;
pub use htx_server as server;
pub use htx_transport as transport;
pub use htx_ws as ws;
