//! The client engine (C12), grounded in `http_client_base.{hpp,cpp}`:
//! verb convenience methods, pooled connection reuse, redirect-following,
//! cookie threading, and WebSocket upgrade.
//!
//! `connection_pool.{hpp,cpp}` only ever tracks a `Weak` reference for
//! liveness (see `htx-pool`'s own doc comment), so nothing in that crate
//! keeps an idle connection alive between requests. This engine adds the
//! missing strong-ownership half itself: an `idle` map of `Arc<Mutex<
//! ClientConnection>>` keyed the same way, mirrored into the `htx-pool`
//! `ConnectionPool` so pool occupancy stays observable the way the
//! original's `connection_pool_.size()` is. A connection is checked back
//! into `idle` after a response completes only if it's still open.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, RwLock};

use htx_pool::{ConnectionPool, PoolKey};
use htx_proto::{Headers, Method};
use htx_transport::{Stream, Target, TlsTarget};
use htx_ws::handshake;
use htx_ws::{Role, WsSession};

use crate::config::{ClientConfig, RetryPolicy};
use crate::connection::{ClientConnection, StreamResult};
use crate::cookie::CookieStore;
use crate::error::{ClientError, Result};
use crate::form::Form;
use crate::request::OutgoingRequest;
use crate::url::ClientUrl;

type PooledConnection = Arc<AsyncMutex<ClientConnection>>;

/// A completed response: status/headers/body plus the final URL (after any
/// redirects), mirroring what `http_client_base`'s callers get back.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub url: ClientUrl,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An HTTP/1.1 client: connection pooling, redirect-following, and cookie
/// persistence across requests to the same engine, grounded in
/// `http_client_base`.
pub struct Client {
    config: ClientConfig,
    retry: RetryPolicy,
    pool: ConnectionPool<AsyncMutex<ClientConnection>>,
    idle: RwLock<HashMap<PoolKey, PooledConnection>>,
    cookies: AsyncMutex<CookieStore>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client {
            retry: RetryPolicy { max_attempts: 3, connect_timeout: config.connect_timeout },
            config,
            pool: ConnectionPool::new(),
            idle: RwLock::new(HashMap::new()),
            cookies: AsyncMutex::new(CookieStore::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send(Method::Get, url, Vec::new(), None).await
    }

    pub async fn head(&self, url: &str) -> Result<Response> {
        self.send(Method::Head, url, Vec::new(), None).await
    }

    pub async fn delete(&self, url: &str) -> Result<Response> {
        self.send(Method::Delete, url, Vec::new(), None).await
    }

    pub async fn options(&self, url: &str) -> Result<Response> {
        self.send(Method::Options, url, Vec::new(), None).await
    }

    pub async fn post(&self, url: &str, body: Vec<u8>, content_type: &str) -> Result<Response> {
        self.send(Method::Post, url, body, Some(content_type.to_string())).await
    }

    pub async fn put(&self, url: &str, body: Vec<u8>, content_type: &str) -> Result<Response> {
        self.send(Method::Put, url, body, Some(content_type.to_string())).await
    }

    pub async fn patch(&self, url: &str, body: Vec<u8>, content_type: &str) -> Result<Response> {
        self.send(Method::Patch, url, body, Some(content_type.to_string())).await
    }

    pub async fn post_form(&self, url: &str, mut form: Form) -> Result<Response> {
        let content_type = form.content_type();
        let body = form.body();
        self.post(url, body, &content_type).await
    }

    /// Starts a fluent request, grounded in `request_builder.hpp`: set
    /// extra headers or a body before picking a terminal verb method.
    pub fn request(&self, url: &str) -> Result<crate::request::RequestBuilder<'_>> {
        let url = ClientUrl::parse(url)?;
        Ok(crate::request::RequestBuilder::new(self, url))
    }

    /// Runs an already fully-built request through the redirect-following
    /// engine, the entry point [`crate::request::RequestBuilder`]'s
    /// terminal methods call into.
    pub async fn execute(&self, mut req: OutgoingRequest) -> Result<Response> {
        if !req.headers.contains("User-Agent") {
            req.headers.set("User-Agent", self.config.user_agent.clone());
        }
        if self.config.auto_decompress && !req.headers.contains("Accept-Encoding") {
            req.headers.set("Accept-Encoding", "gzip, deflate");
        }
        self.send_with_redirects(req, self.config.max_redirects).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<Response> {
        let url = ClientUrl::parse(url)?;
        let mut req = OutgoingRequest::new(method, url);
        if let Some(content_type) = content_type {
            req.set_content(body, &content_type);
        } else {
            req.body = body;
        }
        req.headers.set("User-Agent", self.config.user_agent.clone());
        if self.config.auto_decompress && !req.headers.contains("Accept-Encoding") {
            req.headers.set("Accept-Encoding", "gzip, deflate");
        }
        self.send_with_redirects(req, self.config.max_redirects).await
    }

    /// Sends `req`, following redirects per `http_client_base::
    /// send_with_redirects`: 303 always becomes GET; 301/302 become GET
    /// only if the original method was POST/PUT/DELETE; 307/308 preserve
    /// method and body. `Authorization` survives a redirect only to the
    /// same origin.
    async fn send_with_redirects(&self, mut req: OutgoingRequest, mut redirects_left: u32) -> Result<Response> {
        loop {
            {
                let cookie_header = self.cookies.lock().await.get_cookie_string();
                if !cookie_header.is_empty() {
                    req.headers.set("Cookie", cookie_header);
                }
            }

            let mut head = self.send_once(&req).await?;
            self.cookies.lock().await.update_from_headers(&head.headers);
            self.decompress_in_place(&mut head)?;

            if !self.config.follow_redirects || !is_redirect(head.status) {
                return Ok(Response {
                    status: head.status,
                    reason: head.reason,
                    headers: head.headers,
                    body: head.body,
                    url: req.url,
                });
            }

            let Some(location) = head.headers.get("Location") else {
                return Ok(Response {
                    status: head.status,
                    reason: head.reason,
                    headers: head.headers,
                    body: head.body,
                    url: req.url,
                });
            };
            if redirects_left == 0 {
                // Redirect budget exhausted: return the 3xx as-is rather
                // than erroring, matching the config contract for
                // `max_redirects`.
                return Ok(Response {
                    status: head.status,
                    reason: head.reason,
                    headers: head.headers,
                    body: head.body,
                    url: req.url,
                });
            }
            redirects_left -= 1;

            let next_url = req.url.resolve(location)?;
            let same_origin = next_url.origin() == req.url.origin();

            let (next_method, keep_body) = match head.status {
                303 => (Method::Get, false),
                301 | 302 => {
                    if matches!(req.method, Method::Post | Method::Put | Method::Delete) {
                        (Method::Get, false)
                    } else {
                        (req.method.clone(), matches!(req.method, Method::Get | Method::Head))
                    }
                }
                307 | 308 => (req.method.clone(), true),
                _ => (req.method.clone(), true),
            };

            let mut next_headers = Headers::new();
            for (name, value) in req.headers.iter() {
                if name.eq_ignore_ascii_case("Authorization") && !same_origin {
                    continue;
                }
                if name.eq_ignore_ascii_case("Cookie") || name.eq_ignore_ascii_case("Host") {
                    continue;
                }
                next_headers.push(name, value);
            }

            let next_body = if keep_body { req.body.clone() } else { Vec::new() };
            if !keep_body {
                next_headers.remove("Content-Length");
                next_headers.remove("Content-Type");
            }

            req = OutgoingRequest {
                method: next_method,
                url: next_url,
                headers: next_headers,
                body: next_body,
                unix_socket: req.unix_socket.clone(),
            };
        }
    }

    /// One request/response exchange over a (possibly reused) pooled
    /// connection, with the per-call timeout from `ClientConfig::timeout`.
    async fn send_once(&self, req: &OutgoingRequest) -> Result<htx_proto::ResponseHead> {
        let conn = self.checkout(req).await?;
        let head_request = req.method.is_head();
        let max_body_size = self.config.max_body_size;

        let outcome = tokio::time::timeout(self.config.timeout, async {
            let mut guard = conn.lock().await;
            let head = guard.send_request(&req.encode_head(), &req.body, head_request, max_body_size).await?;
            Ok::<_, ClientError>((head, guard.is_open()))
        })
        .await
        .map_err(|_| ClientError::Timeout)?;

        let (head, still_open) = outcome?;
        if still_open {
            self.checkin(req, conn).await;
        }
        Ok(head)
    }

    /// Streams a GET response through `on_chunk` instead of buffering it,
    /// grounded in `send_streaming`.
    pub async fn get_streaming(
        &self,
        url: &str,
        on_chunk: impl FnMut(&[u8], u64, u64) -> bool,
    ) -> Result<StreamResult> {
        let parsed = ClientUrl::parse(url)?;
        let mut req = OutgoingRequest::new(Method::Get, parsed);
        req.headers.set("User-Agent", self.config.user_agent.clone());
        // Streamed chunks can't be decompressed on the fly, so streaming
        // requests always ask for identity encoding regardless of
        // `auto_decompress`, matching `send_streaming`'s forced override.
        req.headers.set("Accept-Encoding", "identity");
        let cookie_header = self.cookies.lock().await.get_cookie_string();
        if !cookie_header.is_empty() {
            req.headers.set("Cookie", cookie_header);
        }

        let conn = self.checkout(&req).await?;
        let max_body_size = self.config.max_body_size;
        let mut guard = conn.lock().await;
        let result = guard
            .send_request_streaming(&req.encode_head(), &req.body, false, max_body_size, on_chunk)
            .await;
        let still_open = guard.is_open();
        drop(guard);
        if still_open {
            self.checkin(&req, conn).await;
        }
        if !result.headers.is_empty() {
            self.cookies.lock().await.update_from_headers(&result.headers);
        }
        Ok(result)
    }

    /// Upgrades `url` to a WebSocket connection, grounded in
    /// `http_client_base::upgrade_websocket`: scheme normalization
    /// (`http`→`ws`, `https`→`wss` is accepted as-is on input), a
    /// `Sec-WebSocket-Key` handshake, and a 101 + matching accept-key
    /// check before the raw stream is handed to [`htx_ws::WsSession`].
    pub async fn upgrade_websocket(&self, url: &str, protocol: Option<&str>) -> Result<WsSession<Stream>> {
        let url = ClientUrl::parse(url)?;
        let key = handshake::generate_key();

        let mut req = OutgoingRequest::new(Method::Get, url.clone());
        req.headers.set("Upgrade", "websocket");
        req.headers.set("Connection", "Upgrade");
        req.headers.set("Sec-WebSocket-Key", key.clone());
        req.headers.set("Sec-WebSocket-Version", "13");
        if let Some(protocol) = protocol {
            req.headers.set("Sec-WebSocket-Protocol", protocol);
        }
        req.headers.set("User-Agent", self.config.user_agent.clone());

        let conn = self.checkout(&req).await?;
        let mut guard = conn.lock().await;
        let head = guard
            .send_request(&req.encode_head(), &req.body, false, self.config.max_body_size)
            .await?;
        if head.status != 101 {
            return Err(ClientError::NotAWebSocketUpgrade);
        }
        let accept = head.headers.get("Sec-WebSocket-Accept").unwrap_or_default();
        if !handshake::validate_accept_key(accept, &key) {
            return Err(ClientError::NotAWebSocketUpgrade);
        }
        let stream = guard.release_stream().ok_or(ClientError::ConnectionClosed)?;
        drop(guard);
        Ok(WsSession::new(stream, Role::Client))
    }

    /// Transparently decodes `Content-Encoding: gzip`/`deflate` bodies,
    /// grounded in `client_connection.cpp`'s `read_response` decompress
    /// step. A decompression failure is logged and the body is left
    /// as-is, matching the original's catch-and-continue behavior.
    fn decompress_in_place(&self, head: &mut htx_proto::ResponseHead) -> Result<()> {
        if !self.config.auto_decompress {
            return Ok(());
        }
        let Some(encoding) = head.headers.get("Content-Encoding").map(str::to_string) else {
            return Ok(());
        };
        match htx_proto::compress::decode(&encoding, &head.body) {
            Ok(decoded) => {
                head.body = decoded;
                head.headers.remove("Content-Encoding");
            }
            Err(e) => {
                tracing::warn!(error = %e, encoding, "failed to decompress response body");
            }
        }
        Ok(())
    }

    fn pool_key(req: &OutgoingRequest) -> PoolKey {
        match &req.unix_socket {
            Some(path) => PoolKey::unix(path.clone()),
            None => PoolKey::tcp(req.url.host.clone(), req.url.port, req.url.secure),
        }
    }

    async fn checkout(&self, req: &OutgoingRequest) -> Result<PooledConnection> {
        let key = Self::pool_key(req);
        if let Some(conn) = self.idle.write().await.remove(&key) {
            return Ok(conn);
        }

        let target = self.target_for(req);
        let conn = Arc::new(AsyncMutex::new(ClientConnection::new(target, self.retry)));
        self.pool.store(key, &conn);
        Ok(conn)
    }

    async fn checkin(&self, req: &OutgoingRequest, conn: PooledConnection) {
        let key = Self::pool_key(req);
        self.pool.store(key.clone(), &conn);
        self.idle.write().await.insert(key, conn);
    }

    fn target_for(&self, req: &OutgoingRequest) -> Target {
        if let Some(path) = &req.unix_socket {
            return Target::unix(path.clone());
        }
        if req.url.secure {
            let tls = TlsTarget { sni_override: None, insecure: !self.config.verify_ssl };
            Target::tcp_tls(req.url.host.clone(), req.url.port, tls)
        } else {
            Target::tcp(req.url.host.clone(), req.url.port)
        }
    }

    /// Number of pooled connections currently tracked (idle + in-flight),
    /// for tests and diagnostics.
    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_is_success_checks_2xx_range() {
        let resp = Response {
            status: 204,
            reason: "No Content".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
            url: ClientUrl::parse("http://example.com/").unwrap(),
        };
        assert!(resp.is_success());
    }

    #[test]
    fn new_client_has_an_empty_pool() {
        let client = Client::new(ClientConfig::default());
        assert_eq!(client.pool_size(), 0);
    }

    #[test]
    fn is_redirect_covers_the_five_redirect_statuses() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status));
        }
        assert!(!is_redirect(200));
        assert!(!is_redirect(404));
    }
}
