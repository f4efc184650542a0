//! Server-Sent Events writer (C14), grounded in `sse_connection.{hpp}`:
//! a bounded outgoing queue, a 60s idle timeout that closes the socket,
//! and `retry`/`event`/`data` line framing with the extra blank line
//! after `data` values.
//!
//! Unlike the original's two-tick idle timer (mark idle, then close on
//! the *next* tick if still idle — up to ~120s of inactivity), this
//! closes as soon as a single `idle_timeout` period passes with nothing
//! to send, which is simpler to express as one `tokio::time::timeout`
//! around the channel receive and close enough to the same intent.

use std::marker::PhantomData;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::SseConfig;

/// Cloneable handle for pushing events to one SSE connection. Each clone
/// shares the same bounded channel into the writer task spawned by
/// [`crate::response::ServerResponse::start_sse`].
pub struct SseHandle<S> {
    tx: mpsc::Sender<(&'static str, String)>,
    _stream: PhantomData<fn() -> S>,
}

impl<S> Clone for SseHandle<S> {
    fn clone(&self) -> Self {
        SseHandle { tx: self.tx.clone(), _stream: PhantomData }
    }
}

impl<S> SseHandle<S>
where
    S: AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn spawn(writer: WriteHalf<S>, config: SseConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.max_queue_depth);
        tokio::spawn(run_writer(writer, rx, config.idle_timeout));
        SseHandle { tx, _stream: PhantomData }
    }

    pub fn send_retry(&self, millis: u64) -> bool {
        self.push("retry", millis.to_string())
    }

    pub fn send_event(&self, name: impl Into<String>) -> bool {
        self.push("event", name.into())
    }

    pub fn send_data(&self, data: impl Into<String>) -> bool {
        self.push("data", data.into())
    }

    fn push(&self, kind: &'static str, value: String) -> bool {
        match self.tx.try_send((kind, value)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(kind, "sse output queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

async fn run_writer<S>(
    mut writer: WriteHalf<S>,
    mut rx: mpsc::Receiver<(&'static str, String)>,
    idle_timeout: Duration,
) where
    S: AsyncWrite + Unpin,
{
    loop {
        let next = tokio::time::timeout(idle_timeout, rx.recv()).await;
        let Ok(Some((kind, value))) = next else { break };
        let mut buf = Vec::with_capacity(kind.len() + value.len() + 4);
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.push(b'\n');
        if kind == "data" {
            buf.push(b'\n');
        }
        if writer.write_all(&buf).await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn frames_data_event_and_retry_lines() {
        let (client, server) = tokio::io::duplex(256);
        let (_read_half, write_half) = tokio::io::split(server);
        let handle: SseHandle<tokio::io::DuplexStream> =
            SseHandle::spawn(write_half, SseConfig { max_queue_depth: 8, idle_timeout: Duration::from_secs(5) });

        assert!(handle.send_event("update"));
        assert!(handle.send_data("hello"));
        assert!(handle.send_retry(3000));
        drop(handle);

        let mut buf = Vec::new();
        let mut client = client;
        tokio::time::timeout(Duration::from_secs(1), client.read_to_end(&mut buf)).await.unwrap().unwrap();
        assert_eq!(buf, b"event: update\ndata: hello\n\nretry: 3000\n".to_vec());
    }

    #[tokio::test]
    async fn queue_overflow_drops_message_instead_of_blocking() {
        let (client, server) = tokio::io::duplex(4);
        let (_read_half, write_half) = tokio::io::split(server);
        let handle: SseHandle<tokio::io::DuplexStream> =
            SseHandle::spawn(write_half, SseConfig { max_queue_depth: 1, idle_timeout: Duration::from_millis(50) });

        // No `.await` happens between these calls, so the writer task never
        // gets scheduled to drain the channel; once the bounded channel
        // fills, further pushes must report themselves as dropped rather
        // than block.
        for _ in 0..20 {
            handle.send_data("x".repeat(64));
        }
        assert!(!handle.send_data("overflow"));
        drop(client);
    }
}
