//! Shared harness for the integration tests: binds a real
//! [`htx_transport::Listener`] on an ephemeral port and runs
//! [`htx_server::serve`] per accepted connection, the same way
//! `demo_server` does, so client-side tests exercise the genuine TCP path
//! instead of an in-memory duplex pair.

use std::net::SocketAddr;
use std::sync::Arc;

use htx_server::{serve, Router, ServerConfig};
use htx_transport::{Listener, RemotePolicy, ResolvedTarget, Stream, Target};

pub async fn spawn_server(router: Router<Stream>) -> SocketAddr {
    spawn_server_with_config(router, ServerConfig::default()).await
}

pub async fn spawn_server_with_config(router: Router<Stream>, config: ServerConfig) -> SocketAddr {
    let target = Target::tcp("127.0.0.1", 0);
    let resolved = target.resolve().await.expect("resolve loopback target");
    let listener = Listener::bind(&resolved, RemotePolicy::default(), None, 5).await.expect("bind listener");
    let addr = match listener.local_addr().expect("local_addr") {
        ResolvedTarget::Tcp(addr) => addr,
        ResolvedTarget::Unix(_) => unreachable!("tcp target resolves to a tcp address"),
    };

    let router = Arc::new(router);
    tokio::spawn(async move {
        loop {
            let stream = match listener.accept().await {
                Ok(stream) => stream,
                Err(_) => return,
            };
            let router = router.clone();
            let config = config.clone();
            tokio::spawn(async move {
                serve(stream, config, router, None).await;
            });
        }
    });

    addr
}

pub async fn spawn_tls_server(router: Router<Stream>, tls: Arc<rustls::ServerConfig>) -> SocketAddr {
    let target = Target::tcp("127.0.0.1", 0);
    let resolved = target.resolve().await.expect("resolve loopback target");
    let listener =
        Listener::bind(&resolved, RemotePolicy::default(), Some(tls), 5).await.expect("bind tls listener");
    let addr = match listener.local_addr().expect("local_addr") {
        ResolvedTarget::Tcp(addr) => addr,
        ResolvedTarget::Unix(_) => unreachable!("tcp target resolves to a tcp address"),
    };

    let router = Arc::new(router);
    let config = ServerConfig::default();
    tokio::spawn(async move {
        loop {
            let stream = match listener.accept().await {
                Ok(stream) => stream,
                Err(_) => return,
            };
            let router = router.clone();
            let config = config.clone();
            tokio::spawn(async move {
                serve(stream, config, router, None).await;
            });
        }
    });

    addr
}
