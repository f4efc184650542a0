//! Embeddable HTTP/1.1 client: connection reuse, cookies, forms,
//! redirect-following, and WebSocket upgrade, grounded in
//! `thinger::http::client`.

mod client;
mod config;
mod connection;
mod cookie;
mod error;
mod form;
mod request;
mod sync;
mod url;

pub use client::{Client, Response};
pub use config::{ClientConfig, RetryPolicy};
pub use connection::{ClientConnection, StreamResult};
pub use cookie::{Cookie, CookieStore, SameSite};
pub use error::{ClientError, Result};
pub use form::Form;
pub use request::{OutgoingRequest, RequestBuilder};
pub use sync::SyncClient;
pub use url::{url_decode, url_encode, ClientUrl};
