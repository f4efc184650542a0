//! Request facade (C8), grounded in `request.{hpp,cpp}`: URI/route params,
//! convenience accessors, and deferred body reading (read-ahead buffer
//! first, then the socket, transparently decoding chunked transfer
//! encoding and Content-Encoding compression).

use std::collections::HashMap;

use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::oneshot;

use htx_proto::chunked::ChunkedDecoder;
use htx_proto::{Headers, Method, RequestHead};

use crate::error::{Result, ServerError};
use crate::router::AuthLevel;

/// What the connection's read loop gets back once a request is done with
/// the read half: the half itself, plus any read-ahead bytes still
/// unconsumed (pipelined data meant for the *next* request).
pub(crate) type ReclaimedReader<S> = (ReadHalf<S>, Vec<u8>);

/// One in-flight request: the parsed head plus whatever the server had
/// already read off the wire past the header block (pipelined data).
///
/// `ServerRequest` owns the connection's read half for the duration of
/// the handler call. A handler that never touches the read half directly
/// simply drops its `ServerRequest` when done (the common case — building
/// a response from `req.body()` etc.), and `Drop` sends the read half
/// back to the read loop over `return_tx` so pipelining can continue. A
/// handler upgrading the connection (WebSocket, SSE) instead calls
/// [`ServerRequest::into_reader_only`], which takes the read half out and
/// clears `return_tx` so `Drop` knows not to send anything back.
pub struct ServerRequest<S> {
    reader: Option<ReadHalf<S>>,
    return_tx: Option<oneshot::Sender<ReclaimedReader<S>>>,
    pub(crate) read_ahead: Vec<u8>,
    pub(crate) read_ahead_offset: usize,
    pub(crate) head: RequestHead,
    pub(crate) params: HashMap<String, String>,
    pub(crate) auth_level: AuthLevel,
    pub(crate) max_body_size: usize,
    pub(crate) peer_addr: Option<String>,
    chunk: ChunkedDecoder,
    /// Decoded chunk payload bytes already produced by the decoder but not
    /// yet handed to the caller, kept separate from `read_ahead` (which
    /// holds *undecoded* bytes awaiting re-framing) so the two never mix.
    pending_decoded: Vec<u8>,
}

impl<S> Drop for ServerRequest<S> {
    fn drop(&mut self) {
        if let (Some(reader), Some(tx)) = (self.reader.take(), self.return_tx.take()) {
            let leftover = self.read_ahead.split_off(self.read_ahead_offset.min(self.read_ahead.len()));
            let _ = tx.send((reader, leftover));
        }
    }
}

impl<S> ServerRequest<S>
where
    S: tokio::io::AsyncRead + Unpin,
{
    pub(crate) fn new(
        reader: ReadHalf<S>,
        read_ahead: Vec<u8>,
        head: RequestHead,
        max_body_size: usize,
        peer_addr: Option<String>,
        return_tx: oneshot::Sender<ReclaimedReader<S>>,
    ) -> Self {
        ServerRequest {
            reader: Some(reader),
            return_tx: Some(return_tx),
            read_ahead,
            read_ahead_offset: 0,
            head,
            params: HashMap::new(),
            auth_level: AuthLevel::Public,
            max_body_size,
            peer_addr,
            chunk: ChunkedDecoder::new(),
            pending_decoded: Vec::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        &self.head.uri.path
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.head.headers.get(key)
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.head.uri.get(key)
    }

    pub fn query_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.query(key).unwrap_or(default)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    pub fn auth_level(&self) -> AuthLevel {
        self.auth_level
    }

    pub fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }

    pub fn keep_alive(&self) -> bool {
        self.head.headers.keep_alive(self.head.version_major, self.head.version_minor)
    }

    pub fn content_length(&self) -> u64 {
        self.head.headers.content_length()
    }

    pub fn is_chunked(&self) -> bool {
        self.head.headers.is_chunked()
    }

    fn read_ahead_available(&self) -> usize {
        self.read_ahead.len() - self.read_ahead_offset
    }

    /// Raw read bypassing chunked decoding: read-ahead buffer first, then
    /// the socket. Mirrors `request::raw_read_some`.
    async fn raw_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let avail = self.read_ahead_available();
        if avail > 0 {
            let n = avail.min(buf.len());
            let start = self.read_ahead_offset;
            buf[..n].copy_from_slice(&self.read_ahead[start..start + n]);
            self.read_ahead_offset += n;
            if self.read_ahead_offset >= self.read_ahead.len() {
                self.read_ahead.clear();
                self.read_ahead_offset = 0;
            }
            return Ok(n);
        }
        let reader = self.reader.as_mut().expect("read half taken before body fully read");
        Ok(reader.read(buf).await?)
    }

    /// Reads exactly `size` bytes, unless the connection ends first.
    pub async fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        if self.is_chunked() {
            let mut out = Vec::with_capacity(size);
            while out.len() < size {
                let mut chunk = vec![0u8; (size - out.len()).min(8192)];
                let n = self.read_some_chunked(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&chunk[..n]);
            }
            return Ok(out);
        }
        let mut out = vec![0u8; size];
        let mut total = 0;
        while total < size {
            let n = self.raw_read_some(&mut out[total..]).await?;
            if n == 0 {
                break;
            }
            total += n;
        }
        out.truncate(total);
        Ok(out)
    }

    async fn read_some_chunked(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.pending_decoded.is_empty() {
            let n = self.pending_decoded.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pending_decoded[..n]);
            self.pending_decoded.drain(..n);
            return Ok(n);
        }
        loop {
            if self.chunk.is_done() {
                return Ok(0);
            }
            let mut raw = [0u8; 512];
            let raw_read = self.raw_read_some(&mut raw).await?;
            if raw_read == 0 {
                return Ok(0);
            }
            let mut out = Vec::new();
            let consumed = self.chunk.feed(&raw[..raw_read], &mut out)?;
            if consumed < raw_read {
                // Unconsumed bytes are still raw, undecoded wire data; they
                // belong back in read_ahead for the next raw_read_some, not
                // in pending_decoded.
                self.read_ahead.extend_from_slice(&raw[consumed..raw_read]);
                self.read_ahead_offset = 0;
            }
            if !out.is_empty() {
                let n = out.len().min(buf.len());
                buf[..n].copy_from_slice(&out[..n]);
                if n < out.len() {
                    self.pending_decoded.extend_from_slice(&out[n..]);
                }
                return Ok(n);
            }
        }
    }

    /// Reads the whole body into memory (Content-Length or chunked),
    /// applying Content-Encoding decompression, and stores it on the
    /// request head. Mirrors `request::read_body`.
    pub async fn read_body(&mut self) -> Result<()> {
        let mut body = if self.is_chunked() {
            let mut acc = Vec::new();
            loop {
                let mut buf = [0u8; 8192];
                let n = self.read_some_chunked(&mut buf).await?;
                if n == 0 {
                    break;
                }
                if acc.len() + n > self.max_body_size {
                    return Err(ServerError::BodyTooLarge);
                }
                acc.extend_from_slice(&buf[..n]);
            }
            acc
        } else {
            let len = self.content_length() as usize;
            if len > self.max_body_size {
                return Err(ServerError::BodyTooLarge);
            }
            if len == 0 {
                Vec::new()
            } else {
                self.read(len).await?
            }
        };

        if let Some(encoding) = self.head.headers.content_encoding().map(str::to_string) {
            body = htx_proto::compress::decode(&encoding, &body)?;
            self.head.headers.remove("Content-Encoding");
        }
        self.head.body = body;
        Ok(())
    }

    pub fn body(&self) -> &[u8] {
        &self.head.body
    }

    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.head.body)
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        if self.head.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.head.body).ok()
    }

    /// Takes the read half for a protocol upgrade (WebSocket, SSE),
    /// suppressing the normal `Drop`-based hand-back to the read loop —
    /// this connection is leaving HTTP request/response pipelining for
    /// good. Mirrors `response::upgrade_websocket`/`start_sse` releasing
    /// the socket from the HTTP connection.
    pub(crate) fn into_reader_only(mut self) -> ReadHalf<S> {
        self.return_tx = None;
        self.reader.take().expect("read half already taken")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use htx_proto::Uri;
    use tokio::io::AsyncWriteExt;

    fn chunked_head() -> RequestHead {
        let mut headers = Headers::new();
        headers.set("Transfer-Encoding", "chunked");
        RequestHead {
            method: Method::Post,
            uri: Uri::parse("/widgets").unwrap(),
            version_major: 1,
            version_minor: 1,
            headers,
            body: Vec::new(),
        }
    }

    fn new_request(
        reader: ReadHalf<tokio::io::DuplexStream>,
    ) -> (ServerRequest<tokio::io::DuplexStream>, oneshot::Receiver<ReclaimedReader<tokio::io::DuplexStream>>) {
        let (tx, rx) = oneshot::channel();
        (ServerRequest::new(reader, Vec::new(), chunked_head(), 1 << 20, None, tx), rx)
    }

    /// A larger decoded payload than a single caller-supplied read buffer,
    /// delivered over chunk boundaries that don't line up with the read
    /// buffer size, used to be mishandled: decoded bytes the caller's
    /// buffer couldn't hold were spliced back into `read_ahead` (raw wire
    /// bytes) instead of `pending_decoded`, corrupting the next decode.
    #[tokio::test]
    async fn chunked_body_reassembles_across_small_reads() {
        let (client, server) = tokio::io::duplex(4096);
        let (read_half, mut write_half) = tokio::io::split(server);
        let (mut req, _return_rx) = new_request(read_half);

        let payload = "x".repeat(30) + &"y".repeat(40);
        let wire = format!("{:x}\r\n{}\r\n0\r\n\r\n", payload.len(), payload);
        let writer = tokio::spawn(async move {
            write_half.write_all(wire.as_bytes()).await.unwrap();
            drop(client);
        });

        let mut out = Vec::new();
        loop {
            let mut buf = [0u8; 7];
            let n = req.read_some_chunked(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        writer.await.unwrap();
        assert_eq!(out, payload.as_bytes());
    }

    #[tokio::test]
    async fn dropping_request_hands_back_read_half_and_leftover() {
        let (client, server) = tokio::io::duplex(64);
        let (read_half, mut write_half) = tokio::io::split(server);
        let (tx, return_rx) = oneshot::channel();
        let mut head = chunked_head();
        head.headers.remove("Transfer-Encoding");
        head.headers.set("Content-Length", "0");
        let req = ServerRequest::new(read_half, b"next-request-bytes".to_vec(), head, 1024, None, tx);

        write_half.write_all(b"unused").await.unwrap();
        drop(req);

        let (_reader, leftover) = return_rx.await.unwrap();
        assert_eq!(leftover, b"next-request-bytes");
        drop(client);
    }
}
