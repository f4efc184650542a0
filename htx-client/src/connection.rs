//! Outgoing connection (C11), grounded in `client_connection.{hpp,cpp}`:
//! connect-with-retry, request send, response read (buffered or
//! streaming), and release for protocol upgrades.
//!
//! The original's per-connection `std::mutex connection_mutex_` becomes,
//! in this port, the caller's job: `htx-client`'s engine wraps every
//! pooled `ClientConnection` in `Arc<tokio::sync::Mutex<ClientConnection>>`
//! rather than this type locking itself, since only the caller knows the
//! scope a single request/response exchange needs exclusive access for.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use htx_proto::response::{FeedOutcome, MAX_HEADERS_SIZE};
use htx_proto::ResponseHead;
use htx_transport::{Connector, Stream, Target};

use crate::config::RetryPolicy;
use crate::error::{ClientError, Result};

const READ_BUFFER_SIZE: usize = 4096;

/// Result of a streaming download: the caller gets chunks through its own
/// callback and this just reports the final bookkeeping, grounded in
/// `client_connection.hpp`'s `stream_result`.
#[derive(Debug, Default)]
pub struct StreamResult {
    pub status_code: u16,
    pub bytes_transferred: u64,
    pub headers: htx_proto::Headers,
    pub error: Option<String>,
}

/// One outgoing connection to a single `(host, port, ssl)` or UNIX-socket
/// target. Reusable across requests while `is_open()`; a non-keep-alive
/// response or a failed write tears the stream down.
pub struct ClientConnection {
    stream: Option<Stream>,
    target: Target,
    retry: RetryPolicy,
}

impl ClientConnection {
    pub fn new(target: Target, retry: RetryPolicy) -> Self {
        ClientConnection { stream: None, target, retry }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Connects if not already connected, retrying up to
    /// `retry.max_attempts` times. A host-not-found failure aborts
    /// immediately rather than retrying, matching `ensure_connected`'s
    /// special-case for `host_not_found`/`operation_aborted`.
    async fn ensure_connected(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let connector = Connector::new(self.target.clone());
        let mut last_err = None;
        for attempt in 0..self.retry.max_attempts {
            match connector.connect(self.retry.connect_timeout).await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e @ htx_transport::TransportError::HostNotFound(_)) => {
                    return Err(ClientError::Transport(e));
                }
                Err(e) => {
                    tracing::debug!(attempt = attempt + 1, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(ClientError::Transport(last_err.expect("loop ran at least once")))
    }

    /// Sends `head` (request line + headers, already encoded) plus `body`,
    /// then reads a full response into memory. Closes the connection
    /// afterward if the response isn't keep-alive.
    pub async fn send_request(
        &mut self,
        head: &[u8],
        body: &[u8],
        head_request: bool,
        max_body_size: usize,
    ) -> Result<ResponseHead> {
        self.ensure_connected().await?;
        self.write_request(head, body).await?;

        let mut parser = htx_proto::ResponseParser::with_limits(head_request, MAX_HEADERS_SIZE, max_body_size);
        let response_head = self.read_head(&mut parser).await?;
        if !response_head.keep_alive() {
            self.close();
        }
        Ok(response_head)
    }

    /// Sends `head`/`body`, then streams the response body through
    /// `on_chunk` instead of buffering it, grounded in
    /// `send_request_streaming`.
    pub async fn send_request_streaming(
        &mut self,
        head: &[u8],
        body: &[u8],
        head_request: bool,
        max_body_size: usize,
        mut on_chunk: impl FnMut(&[u8], u64, u64) -> bool,
    ) -> StreamResult {
        let mut result = StreamResult::default();
        if let Err(e) = self.ensure_connected().await {
            result.error = Some(e.to_string());
            return result;
        }
        if let Err(e) = self.write_request(head, body).await {
            result.error = Some(e.to_string());
            return result;
        }

        let mut parser = htx_proto::ResponseParser::with_limits(head_request, MAX_HEADERS_SIZE, max_body_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let stream = self.stream.as_mut().expect("ensure_connected succeeded");
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) => {
                    result.error = Some("connection closed before a complete response".to_string());
                    return result;
                }
                Ok(n) => n,
                Err(e) => {
                    result.error = Some(e.to_string());
                    return result;
                }
            };
            let fed = parser.feed_streaming(&buf[..n], |chunk, downloaded, total| {
                result.bytes_transferred = downloaded;
                on_chunk(chunk, downloaded, total)
            });
            if result.status_code == 0 {
                result.status_code = parser.status();
            }
            match fed {
                Ok((_, FeedOutcome::Complete)) => {
                    result.status_code = parser.status();
                    result.headers = parser.take().headers;
                    if !result_keep_alive(&result) {
                        self.close();
                    }
                    return result;
                }
                Ok((_, FeedOutcome::Aborted)) => {
                    result.error = Some("download aborted by caller".to_string());
                    return result;
                }
                Ok((_, FeedOutcome::NeedMore)) => {}
                Err(e) => {
                    result.error = Some(e.to_string());
                    return result;
                }
            }
        }
    }

    async fn write_request(&mut self, head: &[u8], body: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().expect("ensure_connected called first");
        stream.write_all(head).await?;
        if !body.is_empty() {
            stream.write_all(body).await?;
        }
        stream.flush().await?;
        Ok(())
    }

    async fn read_head(&mut self, parser: &mut htx_proto::ResponseParser) -> Result<ResponseHead> {
        let stream = self.stream.as_mut().expect("ensure_connected called first");
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            let (_, complete) = parser.feed(&buf[..n])?;
            if complete {
                return Ok(parser.take());
            }
        }
    }

    pub fn close(&mut self) {
        self.stream = None;
    }

    /// Takes the underlying stream for a protocol upgrade (WebSocket),
    /// grounded in `release_socket`. Leaves this connection closed.
    pub fn release_stream(&mut self) -> Option<Stream> {
        self.stream.take()
    }
}

fn result_keep_alive(result: &StreamResult) -> bool {
    result.headers.keep_alive(1, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use htx_transport::TlsTarget;

    #[test]
    fn starts_closed() {
        let conn = ClientConnection::new(Target::tcp("example.com", 80), RetryPolicy::default());
        assert!(!conn.is_open());
        let _ = TlsTarget::default();
    }
}
