//! Response facade (C8), grounded in `response.{hpp,cpp}`: status/header
//! building, automatic compression, and the upgrade paths (WebSocket,
//! SSE, chunked transfer). Builder methods (`status`, `header`) take
//! `&mut self`; the terminal send methods (`json`, `send`, `error`, ...)
//! consume `self`, so "responded twice" is a compile error rather than
//! the original's runtime `ensure_not_responded` check.

use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use htx_proto::{canonical_reason, Headers};

use crate::error::{Result, ServerError};
use crate::sse::SseHandle;

/// Commands sent to a connection's single writer task. Because the
/// connection's read loop dispatches handlers one at a time (see
/// `connection`'s module docs), sends on this channel are always made in
/// logical response order, so an unbounded MPSC is sufficient to keep
/// writes ordered without any further synchronization.
pub(crate) enum WriterCmd<S> {
    Write(Vec<u8>),
    /// Hands the write half back to the caller, for protocol upgrades.
    /// The writer task exits its loop after sending it.
    Release(oneshot::Sender<WriteHalf<S>>),
}

/// CORS headers added to every response when the router has
/// `enable_cors()` set, matching `response::prepare_response`.
fn add_cors_headers(headers: &mut Headers) {
    headers.set("Access-Control-Allow-Origin", "*");
    headers.set("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS, HEAD, PATCH");
    headers.set("Access-Control-Allow-Headers", "Content-Type, Authorization, X-Requested-With");
    headers.set("Access-Control-Allow-Credentials", "true");
}

pub struct ServerResponse<S> {
    writer: mpsc::UnboundedSender<WriterCmd<S>>,
    keep_alive: bool,
    cors_enabled: bool,
    accept_encoding: Option<String>,
    status: u16,
    reason: Option<String>,
    headers: Headers,
}

impl<S> ServerResponse<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        writer: mpsc::UnboundedSender<WriterCmd<S>>,
        keep_alive: bool,
        cors_enabled: bool,
        accept_encoding: Option<String>,
    ) -> Self {
        ServerResponse {
            writer,
            keep_alive,
            cors_enabled,
            accept_encoding,
            status: 200,
            reason: None,
            headers: Headers::new(),
        }
    }

    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    pub fn header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.set(key, value);
        self
    }

    pub fn reason(&mut self, reason: impl Into<String>) -> &mut Self {
        self.reason = Some(reason.into());
        self
    }

    fn prepare(&mut self) {
        self.headers.set("Connection", if self.keep_alive { "keep-alive" } else { "close" });
        if self.cors_enabled {
            add_cors_headers(&mut self.headers);
        }
    }

    /// Compresses `body` in place if it's large enough, its content type is
    /// compressible, it isn't already encoded, and the peer advertised
    /// support, mirroring `response::compress_response_if_needed`.
    fn compress_if_needed(&mut self, body: &mut Vec<u8>) {
        if body.len() < htx_proto::compress::MIN_COMPRESSIBLE_SIZE {
            return;
        }
        if self.headers.contains("Content-Encoding") {
            return;
        }
        let content_type = self.headers.get("Content-Type").unwrap_or("").to_string();
        if content_type.is_empty() || !htx_proto::compress::is_compressible_mime(&content_type) {
            return;
        }
        let Some(accept_encoding) = self.accept_encoding.as_deref() else { return };
        let Some(encoding) = htx_proto::compress::negotiate(accept_encoding, &["gzip", "deflate"])
        else {
            return;
        };
        match htx_proto::compress::encode(encoding, body) {
            Ok(compressed) => {
                *body = compressed;
                self.headers.set("Content-Encoding", encoding);
            }
            Err(e) => warn!(error = %e, "response compression failed, sending uncompressed"),
        }
    }

    fn send_cmd(&self, cmd: WriterCmd<S>) -> Result<()> {
        self.writer.send(cmd).map_err(|_| ServerError::ConnectionLost)
    }

    fn finish(mut self, mut body: Vec<u8>) -> Result<()> {
        self.prepare();
        self.compress_if_needed(&mut body);
        self.headers.set("Content-Length", body.len().to_string());
        let reason = self.reason.clone().unwrap_or_else(|| canonical_reason(self.status).to_string());
        let mut out = htx_proto::encode_head(self.status, &reason, &self.headers);
        out.extend_from_slice(&body);
        self.send_cmd(WriterCmd::Write(out))
    }

    pub fn json(mut self, data: &serde_json::Value, status: u16) -> Result<()> {
        self.status = status;
        self.headers.set("Content-Type", "application/json");
        let body = serde_json::to_vec(data).map_err(|e| {
            ServerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.finish(body)
    }

    pub fn send(mut self, text: impl Into<String>, content_type: &str) -> Result<()> {
        self.headers.set("Content-Type", content_type);
        self.finish(text.into().into_bytes())
    }

    pub fn html(self, html: impl Into<String>) -> Result<()> {
        self.send(html, "text/html")
    }

    pub fn error(mut self, status: u16, message: &str) -> Result<()> {
        self.status = status;
        if message.is_empty() {
            self.finish(Vec::new())
        } else {
            self.headers.set("Content-Type", "text/plain");
            self.finish(message.as_bytes().to_vec())
        }
    }

    pub fn send_response(mut self, status: u16, headers: Headers, body: Vec<u8>) -> Result<()> {
        self.status = status;
        for (name, value) in headers.iter() {
            self.headers.set(name.to_string(), value.to_string());
        }
        self.finish(body)
    }

    pub fn redirect(mut self, url: &str, status: u16) -> Result<()> {
        self.status = status;
        self.headers.set("Location", url);
        self.finish(Vec::new())
    }

    pub(crate) fn no_content_cors_preflight(mut self) -> Result<()> {
        self.status = 204;
        self.finish(Vec::new())
    }

    /// Sends the chunked-transfer header and returns a handle for writing
    /// further chunks, mirroring `start_chunked`/`write_chunk`/`end_chunked`.
    pub fn start_chunked(mut self, content_type: &str, status: u16) -> Result<ChunkedResponse<S>> {
        self.status = status;
        self.prepare();
        self.headers.set("Content-Type", content_type);
        self.headers.set("Transfer-Encoding", "chunked");
        self.headers.set("X-Content-Type-Options", "nosniff");
        self.headers.remove("Content-Length");
        let reason = canonical_reason(self.status).to_string();
        let out = htx_proto::encode_head(self.status, &reason, &self.headers);
        self.send_cmd(WriterCmd::Write(out))?;
        Ok(ChunkedResponse { writer: self.writer })
    }

    /// Sends the `101 Switching Protocols` response and hands the
    /// reassembled stream to the caller, mirroring `upgrade_websocket`.
    /// Requires the owning connection's read half, since a WebSocket
    /// session needs the full duplex stream, not just the write side.
    pub async fn upgrade_websocket(
        mut self,
        req: crate::request::ServerRequest<S>,
        supported_protocols: &[&str],
    ) -> Result<htx_ws::WsSession<S>> {
        let upgrade_header = req.header("Upgrade").map(str::to_string);
        let protocol_header = req.header("Sec-WebSocket-Protocol").map(str::to_string);
        let ws_key = req.header("Sec-WebSocket-Key").map(str::to_string);

        if !upgrade_header.as_deref().map(|h| h.eq_ignore_ascii_case("websocket")).unwrap_or(false) {
            return Err(ServerError::NotAWebSocketUpgrade);
        }
        if let Some(protocol) = protocol_header.as_deref() {
            if !supported_protocols.is_empty() && !supported_protocols.contains(&protocol) {
                return Err(ServerError::UnsupportedWebSocketProtocol);
            }
        } else if !supported_protocols.is_empty() {
            return Err(ServerError::UnsupportedWebSocketProtocol);
        }
        let Some(key) = ws_key.as_deref() else { return Err(ServerError::NotAWebSocketUpgrade) };

        self.status = 101;
        self.headers.set("Upgrade", "websocket");
        self.headers.set("Connection", "Upgrade");
        self.headers.set("Sec-WebSocket-Accept", htx_ws::handshake::accept_key(key));
        if let Some(protocol) = protocol_header {
            self.headers.set("Sec-WebSocket-Protocol", protocol);
        }
        let reason = canonical_reason(self.status).to_string();
        let out = htx_proto::encode_head(self.status, &reason, &self.headers);
        self.send_cmd(WriterCmd::Write(out))?;

        let (tx, rx) = oneshot::channel();
        self.send_cmd(WriterCmd::Release(tx))?;
        let writer = rx.await.map_err(|_| ServerError::ConnectionLost)?;
        let reader = req.into_reader_only();
        let stream = tokio::io::unsplit(reader, writer);
        Ok(htx_ws::WsSession::new(stream, htx_ws::Role::Server))
    }

    /// Sends the SSE response headers and returns a handle for pushing
    /// events, mirroring `start_sse`. Like the WebSocket upgrade, this
    /// gives up the write half permanently: the SSE writer task owns it
    /// for the rest of the connection's life.
    pub async fn start_sse(
        mut self,
        req: crate::request::ServerRequest<S>,
        config: crate::config::SseConfig,
    ) -> Result<SseHandle<S>> {
        self.status = 200;
        self.prepare();
        self.headers.set("Content-Type", "text/event-stream");
        self.headers.set("Cache-Control", "no-cache");
        self.headers.set("Connection", "keep-alive");
        self.headers.set("X-Accel-Buffering", "no");
        self.headers.remove("Content-Length");
        let reason = canonical_reason(self.status).to_string();
        let out = htx_proto::encode_head(self.status, &reason, &self.headers);
        self.send_cmd(WriterCmd::Write(out))?;

        let (tx, rx) = oneshot::channel();
        self.send_cmd(WriterCmd::Release(tx))?;
        let write_half = rx.await.map_err(|_| ServerError::ConnectionLost)?;
        // SSE is one-directional from the server; the read half is simply
        // dropped rather than reused, which also suppresses `ServerRequest`'s
        // usual hand-back of the read half to the connection's read loop.
        drop(req.into_reader_only());
        Ok(SseHandle::spawn(write_half, config))
    }
}

/// Handle returned by [`ServerResponse::start_chunked`].
pub struct ChunkedResponse<S> {
    writer: mpsc::UnboundedSender<WriterCmd<S>>,
}

impl<S> ChunkedResponse<S> {
    pub fn write_chunk(&self, data: &[u8]) -> Result<()> {
        self.writer
            .send(WriterCmd::Write(htx_proto::chunked::encode_chunk(data)))
            .map_err(|_| ServerError::ConnectionLost)
    }

    pub fn end_chunked(self) -> Result<()> {
        self.writer
            .send(WriterCmd::Write(htx_proto::chunked::encode_final_chunk()))
            .map_err(|_| ServerError::ConnectionLost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestStream = tokio::io::DuplexStream;

    fn new_response(keep_alive: bool, cors_enabled: bool) -> (ServerResponse<TestStream>, mpsc::UnboundedReceiver<WriterCmd<TestStream>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ServerResponse::new(tx, keep_alive, cors_enabled, None), rx)
    }

    fn recv_written(rx: &mut mpsc::UnboundedReceiver<WriterCmd<TestStream>>) -> Vec<u8> {
        match rx.try_recv().expect("expected a write command") {
            WriterCmd::Write(bytes) => bytes,
            WriterCmd::Release(_) => panic!("expected Write, got Release"),
        }
    }

    #[test]
    fn json_sets_content_type_and_length() {
        let (res, mut rx) = new_response(true, false);
        res.json(&serde_json::json!({"ok": true}), 200).unwrap();
        let out = recv_written(&mut rx);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("{\"ok\":true}"));
    }

    #[test]
    fn close_connection_sets_connection_close() {
        let (res, mut rx) = new_response(false, false);
        res.send("hi", "text/plain").unwrap();
        let out = recv_written(&mut rx);
        assert!(String::from_utf8(out).unwrap().contains("Connection: close\r\n"));
    }

    #[test]
    fn cors_headers_added_when_enabled() {
        let (res, mut rx) = new_response(true, true);
        res.send("hi", "text/plain").unwrap();
        let out = String::from_utf8(recv_written(&mut rx)).unwrap();
        assert!(out.contains("Access-Control-Allow-Origin: *\r\n"));
    }

    #[test]
    fn small_body_is_not_compressed() {
        let mut res = ServerResponse::new(mpsc::unbounded_channel().0, true, false, Some("gzip".to_string()));
        let mut body = b"short".to_vec();
        res.headers.set("Content-Type", "text/plain");
        res.compress_if_needed(&mut body);
        assert_eq!(body, b"short");
        assert!(!res.headers.contains("Content-Encoding"));
    }

    #[test]
    fn large_compressible_body_is_compressed_when_accepted() {
        let mut res = ServerResponse::new(mpsc::unbounded_channel().0, true, false, Some("gzip, deflate".to_string()));
        res.headers.set("Content-Type", "text/plain");
        let mut body = vec![b'a'; 1024];
        res.compress_if_needed(&mut body);
        assert_eq!(res.headers.get("Content-Encoding"), Some("gzip"));
        assert_ne!(body, vec![b'a'; 1024]);
    }

    #[test]
    fn redirect_sets_location_and_status() {
        let (res, mut rx) = new_response(true, false);
        res.redirect("/new-path", 302).unwrap();
        let out = String::from_utf8(recv_written(&mut rx)).unwrap();
        assert!(out.starts_with("HTTP/1.1 302 Found\r\n"));
        assert!(out.contains("Location: /new-path\r\n"));
    }
}
