//! The WebSocket session (C13): frame read/write, masking, fragmentation,
//! control-frame absorption, and the liveness ping/pong timer.
//!
//! Grounded in `websocket.{hpp,cpp}`: the read side mirrors `read_frame`'s
//! recursion-via-loop over control frames (the caller's logical read never
//! observes a bare ping/pong/close), and the write side mirrors
//! `send_message`'s header layout and client-side masking. The write
//! mutex and single-task read path (§5) become, in Rust, a stream split
//! into a `ReadHalf` owned by the session and a `WriteHalf` behind
//! `tokio::sync::Mutex` shared with the liveness task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::error::{Result, WsError};
use crate::frame::{self, Opcode};

const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONTROL_PAYLOAD: usize = 125;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

struct FragmentState {
    new_message: bool,
    message_opcode: Opcode,
    frame_remaining: u64,
    masked: bool,
    mask: [u8; 4],
}

/// A live WebSocket connection. `split_io` yields the read half to the
/// caller's read loop and keeps the write half (plus liveness flags) in a
/// shared handle so a liveness task can ping concurrently.
pub struct WsSession<S> {
    reader: ReadHalf<S>,
    writer: Arc<AsyncMutex<WriteHalf<S>>>,
    role: Role,
    frag: FragmentState,
    close_received: Arc<AtomicBool>,
    close_sent: Arc<AtomicBool>,
    data_received: Arc<AtomicBool>,
    pending_ping: Arc<AtomicBool>,
}

impl<S> WsSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S, role: Role) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        WsSession {
            reader,
            writer: Arc::new(AsyncMutex::new(writer)),
            role,
            frag: FragmentState {
                new_message: true,
                message_opcode: Opcode::Binary,
                frame_remaining: 0,
                masked: false,
                mask: [0; 4],
            },
            close_received: Arc::new(AtomicBool::new(false)),
            close_sent: Arc::new(AtomicBool::new(false)),
            data_received: Arc::new(AtomicBool::new(true)),
            pending_ping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle the caller can hand to a spawned task to drive the 60s
    /// idle-ping / 60s ping-timeout liveness loop alongside this session's
    /// read loop.
    pub fn liveness(&self) -> Liveness<S> {
        Liveness {
            writer: self.writer.clone(),
            role: self.role,
            data_received: self.data_received.clone(),
            pending_ping: self.pending_ping.clone(),
            close_sent: self.close_sent.clone(),
        }
    }

    /// Read one logical WebSocket message, absorbing and replying to any
    /// ping/pong/close frames along the way. Returns `Err(ConnectionClosed)`
    /// once a close frame (ours or the peer's) has been processed.
    pub async fn read_message(&mut self) -> Result<WsMessage> {
        let mut payload = Vec::new();
        loop {
            let mut chunk = [0u8; 4096];
            let n = self.read_frame(&mut chunk).await?;
            if n == 0 {
                if self.frag.new_message {
                    break;
                }
                continue;
            }
            payload.extend_from_slice(&chunk[..n]);
            if self.frag.new_message && self.frag.frame_remaining == 0 {
                break;
            }
        }
        match self.frag.message_opcode {
            Opcode::Text => {
                let text = String::from_utf8(payload).map_err(|_| {
                    WsError::Parse(htx_errors::ParseError::InvalidUtf8)
                })?;
                Ok(WsMessage::Text(text))
            }
            _ => Ok(WsMessage::Binary(payload)),
        }
    }

    /// Read up to `buf.len()` bytes of the current (or next) data frame,
    /// absorbing control frames inline. Returns 0 at a message boundary.
    pub async fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if self.frag.frame_remaining > 0 {
                let to_read = self.frag.frame_remaining.min(buf.len() as u64) as usize;
                self.reader.read_exact(&mut buf[..to_read]).await?;
                if self.frag.masked {
                    frame::unmask(&mut buf[..to_read], self.frag.mask);
                }
                self.frag.frame_remaining -= to_read as u64;
                return Ok(to_read);
            }

            let mut header = [0u8; 2];
            self.reader.read_exact(&mut header).await?;
            self.data_received.store(true, Ordering::Relaxed);

            if frame::reserved_bits_set(header[0]) {
                return Err(WsError::ReservedBitsSet);
            }
            let start = frame::decode_header_start(header[0], header[1]);
            let opcode = frame::Opcode::from_byte(start.opcode_byte)
                .ok_or(WsError::UnknownOpcode(start.opcode_byte))?;

            if !start.masked && self.role == Role::Server {
                return Err(WsError::UnmaskedClientFrame);
            }

            if opcode.is_control() {
                // Control frames may arrive interleaved inside a
                // fragmented message, regardless of `new_message`, but
                // must never themselves be fragmented.
                if !start.fin {
                    return Err(WsError::InvalidControlFrame);
                }
            } else if self.frag.new_message {
                match opcode {
                    Opcode::Continuation => return Err(WsError::UnexpectedContinuation),
                    Opcode::Text | Opcode::Binary => self.frag.message_opcode = opcode,
                    _ => unreachable!(),
                }
            } else if opcode != Opcode::Continuation {
                return Err(WsError::UnexpectedContinuation);
            }

            let payload_len = match start.length_field {
                126 => {
                    let mut ext = [0u8; 2];
                    self.reader.read_exact(&mut ext).await?;
                    u16::from_be_bytes(ext) as u64
                }
                127 => {
                    let mut ext = [0u8; 8];
                    self.reader.read_exact(&mut ext).await?;
                    u64::from_be_bytes(ext)
                }
                n => n as u64,
            };

            self.frag.masked = start.masked;
            if start.masked {
                self.reader.read_exact(&mut self.frag.mask).await?;
            }

            if opcode.is_control() {
                if payload_len as usize > MAX_CONTROL_PAYLOAD {
                    return Err(WsError::InvalidControlFrame);
                }
                let mut control = vec![0u8; payload_len as usize];
                if !control.is_empty() {
                    self.reader.read_exact(&mut control).await?;
                    if start.masked {
                        frame::unmask(&mut control, self.frag.mask);
                    }
                }
                match opcode {
                    Opcode::Close => {
                        debug!("received close frame");
                        self.close_received.store(true, Ordering::Relaxed);
                        if !self.close_sent.load(Ordering::Relaxed) {
                            self.send_close(&[]).await?;
                        }
                        return Err(WsError::ConnectionClosed);
                    }
                    Opcode::Ping => {
                        debug!("received ping frame");
                        self.send_pong(&control).await?;
                        continue;
                    }
                    Opcode::Pong => {
                        debug!("received pong frame");
                        self.pending_ping.store(false, Ordering::Relaxed);
                        self.data_received.store(false, Ordering::Relaxed);
                        continue;
                    }
                    _ => unreachable!(),
                }
            }

            self.frag.frame_remaining = payload_len;
            if payload_len == 0 {
                if start.fin {
                    self.frag.new_message = true;
                } else {
                    self.frag.new_message = false;
                }
                return Ok(0);
            }

            let to_read = payload_len.min(buf.len() as u64) as usize;
            self.reader.read_exact(&mut buf[..to_read]).await?;
            if start.masked {
                frame::unmask(&mut buf[..to_read], self.frag.mask);
            }
            self.frag.frame_remaining -= to_read as u64;
            self.frag.new_message = self.frag.frame_remaining == 0 && start.fin;
            return Ok(to_read);
        }
    }

    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send_message(Opcode::Text, text.as_bytes()).await
    }

    pub async fn send_binary(&self, data: &[u8]) -> Result<()> {
        self.send_message(Opcode::Binary, data).await
    }

    pub async fn send_ping(&self, payload: &[u8]) -> Result<()> {
        self.send_message(Opcode::Ping, payload).await
    }

    pub async fn send_pong(&self, payload: &[u8]) -> Result<()> {
        self.send_message(Opcode::Pong, payload).await
    }

    async fn send_close(&self, payload: &[u8]) -> Result<()> {
        self.send_message(Opcode::Close, payload).await?;
        self.close_sent.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Sends a close frame, then races up to 5s for the peer's close ack
    /// before giving up and shutting the socket down regardless.
    pub async fn close_graceful(&mut self) -> Result<()> {
        if !self.close_sent.load(Ordering::Relaxed) {
            self.send_close(&[]).await?;
        }
        if !self.close_received.load(Ordering::Relaxed) {
            let wait_ack = async {
                let mut scratch = [0u8; 125];
                loop {
                    match self.read_frame(&mut scratch).await {
                        Ok(_) => {}
                        Err(WsError::ConnectionClosed) => return,
                        Err(_) => return,
                    }
                }
            };
            if tokio::time::timeout(CLOSE_ACK_TIMEOUT, wait_ack).await.is_err() {
                warn!("timeout while waiting for close acknowledgement");
            }
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }

    async fn send_message(&self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        let mask = match self.role {
            Role::Client => Some(random_mask()),
            Role::Server => None,
        };
        let header = frame::encode_header(opcode, payload.len(), mask);
        let mut writer = self.writer.lock().await;
        writer.write_all(&header).await?;
        match mask {
            Some(mask) => {
                let mut masked = payload.to_vec();
                frame::unmask(&mut masked, mask);
                writer.write_all(&masked).await?;
            }
            None => writer.write_all(payload).await?,
        }
        writer.flush().await?;
        Ok(())
    }
}

fn random_mask() -> [u8; 4] {
    let mut mask = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut mask);
    mask
}

/// Shared liveness handle: a 60s timer that pings on silence and closes
/// the connection if a ping goes unanswered for a second tick.
pub struct Liveness<S> {
    writer: Arc<AsyncMutex<WriteHalf<S>>>,
    role: Role,
    data_received: Arc<AtomicBool>,
    pending_ping: Arc<AtomicBool>,
    close_sent: Arc<AtomicBool>,
}

impl<S> Liveness<S>
where
    S: AsyncWrite + Unpin + Send + 'static,
{
    pub async fn run(self) -> Result<()> {
        loop {
            tokio::time::sleep(IDLE_TIMEOUT).await;
            if self.data_received.swap(false, Ordering::Relaxed) {
                continue;
            }
            if !self.pending_ping.swap(true, Ordering::Relaxed) {
                debug!("websocket idle, sending liveness ping");
                let mask = match self.role {
                    Role::Client => Some(random_mask()),
                    Role::Server => None,
                };
                let header = frame::encode_header(Opcode::Ping, 0, mask);
                let mut writer = self.writer.lock().await;
                writer.write_all(&header).await?;
                writer.flush().await?;
            } else {
                warn!("websocket ping timeout, closing connection");
                self.close_sent.store(true, Ordering::Relaxed);
                let mut writer = self.writer.lock().await;
                let _ = writer.shutdown().await;
                return Err(WsError::ConnectionClosed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;

    #[tokio::test]
    async fn a_fragmented_ping_mid_message_is_a_protocol_error() {
        let (mut peer, local) = tokio::io::duplex(256);
        let mut session = WsSession::new(local, Role::Client);

        // Fragment start: text frame, FIN=0, payload "ab", unmasked.
        peer.write_all(&[0x01, 0x02, b'a', b'b']).await.unwrap();
        // Interleaved ping with FIN=0, which is never valid for a control frame.
        peer.write_all(&[0x09, 0x00]).await.unwrap();

        let mut buf = [0u8; 16];
        session.read_frame(&mut buf).await.unwrap();
        let err = session.read_frame(&mut buf).await.unwrap_err();
        assert!(matches!(err, WsError::InvalidControlFrame));
    }
}
