//! Minimal demo: a router with a couple of routes served over plain TCP,
//! wired the way `htx-server`'s own tests wire `serve`, but over a real
//! `Listener` instead of an in-memory duplex pair.

use std::sync::Arc;

use htx::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut router: Router<Stream> = Router::new();
    router.route(Method::Get, "/ping", |_req, res| async move {
        let _ = res.send("pong", "text/plain");
    });
    router.route(Method::Get, "/echo/:word", |req, res| async move {
        let word = req.param("word").unwrap_or_default().to_string();
        let _ = res.send(word, "text/plain");
    });
    let router = Arc::new(router);

    let target = Target::tcp("127.0.0.1", 8080);
    let resolved = target.resolve().await?;
    let listener = Listener::bind(&resolved, RemotePolicy::default(), None, 5).await?;
    tracing::info!(addr = ?listener.local_addr()?, "demo server listening");

    let config = ServerConfig::default();
    loop {
        let stream = listener.accept().await?;
        let router = router.clone();
        let config = config.clone();
        tokio::spawn(async move {
            serve(stream, config, router, None).await;
        });
    }
}
