//! Per-connection read loop (C7), grounded in `server_connection.cpp`.
//!
//! The original's `request_queue_`/`writing_` flag/`process_output_queue`
//! machinery reads like it supports concurrent, out-of-order response
//! writes across pipelined requests. It doesn't: `read_loop` does
//! `co_await handler_(req)` and only proceeds to the next iteration once
//! that completes, so handlers never actually run concurrently with each
//! other. This port keeps that real behavior and drops the now-pointless
//! queueing: one read loop dispatches requests to handlers strictly in
//! order, and a single writer task (fed by an unbounded channel, see
//! `response::WriterCmd`) writes whatever bytes handlers hand it in the
//! order they're sent — always logical response order, since only one
//! handler runs at a time.
//!
//! `ServerConfig::read_buffer_size` is 8 KiB; the original's literal
//! `MAX_BUFFER_SIZE` is 4096, but the governing requirements for this
//! port call for an 8 KiB read buffer, so that value wins here.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use htx_proto::RequestParser;

use crate::config::ServerConfig;
use crate::request::ServerRequest;
use crate::response::{ServerResponse, WriterCmd};
use crate::router::Router;

/// Drives one accepted connection to completion: parses pipelined
/// requests off `stream`, dispatches each to `router`, and writes
/// responses back in order. Returns once the peer closes the connection,
/// the connection times out, a non-keep-alive request completes, or a
/// handler upgrades the connection to another protocol.
pub async fn serve<S>(stream: S, config: ServerConfig, router: Arc<Router<S>>, peer_addr: Option<String>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_writer(writer, rx));

    read_loop(reader, tx, config, router, peer_addr).await;
}

/// Owns the write half for the connection's lifetime, serializing writes
/// from whichever handler is currently running. `Release` hands the write
/// half to a protocol upgrade and ends this task.
async fn run_writer<S>(mut writer: tokio::io::WriteHalf<S>, mut rx: mpsc::UnboundedReceiver<WriterCmd<S>>)
where
    S: AsyncWrite + Unpin,
{
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCmd::Write(bytes) => {
                if writer.write_all(&bytes).await.is_err() || writer.flush().await.is_err() {
                    break;
                }
            }
            WriterCmd::Release(reply) => {
                let _ = reply.send(writer);
                return;
            }
        }
    }
    let _ = writer.shutdown().await;
}

fn send_stock_error<S>(writer_tx: &mpsc::UnboundedSender<WriterCmd<S>>, status: u16, keep_alive: bool) {
    let mut headers = htx_proto::Headers::new();
    headers.set("Content-Type", "text/plain");
    headers.set("Connection", if keep_alive { "keep-alive" } else { "close" });
    let body = htx_proto::canonical_reason(status).as_bytes().to_vec();
    headers.set("Content-Length", body.len().to_string());
    let mut out = htx_proto::encode_head(status, htx_proto::canonical_reason(status), &headers);
    out.extend_from_slice(&body);
    let _ = writer_tx.send(WriterCmd::Write(out));
}

async fn read_loop<S>(
    mut reader: tokio::io::ReadHalf<S>,
    writer_tx: mpsc::UnboundedSender<WriterCmd<S>>,
    config: ServerConfig,
    router: Arc<Router<S>>,
    peer_addr: Option<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut parser = RequestParser::new(true);
    let mut buffer = vec![0u8; config.read_buffer_size];
    let mut buffered = 0usize;

    loop {
        if buffered == 0 {
            let read = tokio::time::timeout(config.connection_timeout, reader.read(&mut buffer)).await;
            let n = match read {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    debug!(error = %e, "connection read error, closing");
                    break;
                }
                Err(_) => {
                    debug!("connection idle timeout, closing");
                    break;
                }
            };
            if n == 0 {
                break;
            }
            buffered = n;
        }

        let (consumed, complete) = match parser.feed(&buffer[..buffered]) {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %e, "malformed request, closing connection");
                send_stock_error(&writer_tx, 400, false);
                break;
            }
        };

        if !complete {
            // All buffered bytes fed with no complete head yet; read more.
            buffered = 0;
            continue;
        }

        let head = match parser.take() {
            Ok(head) => head,
            Err(e) => {
                debug!(error = %e, "malformed request target, closing connection");
                send_stock_error(&writer_tx, 400, false);
                break;
            }
        };
        let keep_alive = head.keep_alive();
        let method = head.method.clone();
        let path = head.uri.path.clone();
        let leftover = buffer[consumed..buffered].to_vec();
        let accept_encoding = head.headers.get("Accept-Encoding").map(str::to_string);

        let (return_tx, return_rx) = oneshot::channel();
        let mut req =
            ServerRequest::new(reader, leftover, head, config.max_body_size, peer_addr.clone(), return_tx);

        match router.find(&method, &path) {
            Some((handler, auth_level, params)) => {
                req.auth_level = auth_level;
                for (name, value) in params {
                    req.set_param(name, value);
                }
                let res = ServerResponse::new(writer_tx.clone(), keep_alive, router.cors_enabled(), accept_encoding);
                handler.call(req, res).await;
            }
            None => match router.fallback_handler() {
                Some(fallback) => {
                    let res =
                        ServerResponse::new(writer_tx.clone(), keep_alive, router.cors_enabled(), accept_encoding);
                    fallback.call(req, res).await;
                }
                None => {
                    let status = if router.has_routes_for(&method) { 405 } else { 404 };
                    drop(req);
                    send_stock_error(&writer_tx, status, keep_alive);
                }
            },
        }

        match return_rx.await {
            Ok((new_reader, new_leftover)) => {
                reader = new_reader;
                if new_leftover.is_empty() {
                    buffered = 0;
                } else {
                    buffer[..new_leftover.len()].copy_from_slice(&new_leftover);
                    buffered = new_leftover.len();
                }
            }
            Err(_) => {
                // The handler upgraded the connection (WebSocket/SSE) and
                // took ownership of the stream; this read loop is done.
                return;
            }
        }

        if !keep_alive {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_config() -> ServerConfig {
        ServerConfig {
            read_buffer_size: 256,
            connection_timeout: std::time::Duration::from_secs(2),
            max_body_size: 1 << 16,
            cors_enabled: false,
        }
    }

    async fn read_response(client: &mut tokio::io::DuplexStream, want: &str) -> String {
        let mut buf = vec![0u8; 4096];
        let mut total = Vec::new();
        loop {
            let n = tokio::time::timeout(std::time::Duration::from_secs(1), client.read(&mut buf))
                .await
                .expect("timed out waiting for response")
                .unwrap();
            total.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&total).to_string();
            if text.contains(want) || n == 0 {
                return text;
            }
        }
    }

    #[tokio::test]
    async fn dispatches_matching_route_and_closes_without_keep_alive() {
        let mut router: Router<tokio::io::DuplexStream> = Router::new();
        router.route(htx_proto::Method::Get, "/ping", |_req, res| async move {
            res.send("pong", "text/plain").unwrap();
        });

        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(server, test_config(), Arc::new(router), None));

        client.write_all(b"GET /ping HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await.unwrap();
        let text = read_response(&mut client, "pong").await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("pong"));
    }

    #[tokio::test]
    async fn unmatched_route_with_no_fallback_returns_404() {
        let router: Router<tokio::io::DuplexStream> = Router::new();
        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(server, test_config(), Arc::new(router), None));

        client.write_all(b"GET /missing HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await.unwrap();
        let text = read_response(&mut client, "HTTP/1.1 404").await;
        assert!(text.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn keep_alive_connection_serves_two_pipelined_requests() {
        let mut router: Router<tokio::io::DuplexStream> = Router::new();
        router.route(htx_proto::Method::Get, "/a", |_req, res| async move {
            res.send("first", "text/plain").unwrap();
        });
        router.route(htx_proto::Method::Get, "/b", |_req, res| async move {
            res.send("second", "text/plain").unwrap();
        });

        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve(server, test_config(), Arc::new(router), None));

        client.write_all(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let first = read_response(&mut client, "first").await;
        assert!(first.contains("Connection: keep-alive\r\n"));
        assert!(first.ends_with("first"));

        client.write_all(b"GET /b HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await.unwrap();
        let second = read_response(&mut client, "second").await;
        assert!(second.ends_with("second"));
    }
}
