//! Minimal demo: issues a couple of requests against `demo-server` (or
//! any HTTP/1.1 endpoint passed as the first argument).

use htx::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let base = std::env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
    let client = Client::new(ClientConfig::default());

    let resp = client.get(&format!("{base}/ping")).await?;
    tracing::info!(status = resp.status, body = %String::from_utf8_lossy(&resp.body), "GET /ping");

    let resp = client.get(&format!("{base}/echo/hello")).await?;
    tracing::info!(status = resp.status, body = %String::from_utf8_lossy(&resp.body), "GET /echo/hello");

    Ok(())
}
