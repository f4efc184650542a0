//! Server connection loop, request/response facade, router, and SSE
//! writer for the `htx` HTTP/1.1 stack (C7-C9, C14), grounded in
//! `server_connection.{hpp,cpp}`, `request.{hpp,cpp}`,
//! `response.{hpp,cpp}`, `routing/*`, and `sse_connection.hpp`.

mod config;
mod connection;
mod error;
mod request;
mod response;
mod router;
mod sse;

pub use config::{ServerConfig, SseConfig};
pub use connection::serve;
pub use error::{Result, ServerError};
pub use request::ServerRequest;
pub use response::{ChunkedResponse, ServerResponse};
pub use router::{AuthLevel, Handler, Router};
pub use sse::SseHandle;
