//! Outgoing request construction. `original_source/` retains no
//! `common/http_request.{hpp,cpp}` in the filtered pack (only
//! `set_url`/`get_host`/`get_port`/`is_ssl`/`to_socket`-style usage is
//! visible at call sites in `client_connection.cpp` and
//! `http_client_base.cpp`), so the request-head wire layout here is
//! grounded instead on the already-ported `htx_proto::response::
//! encode_head`'s precedent (itself grounded on `http_response::
//! to_buffer`): request line, then headers, then a blank line.

use htx_proto::{Headers, Method};

use crate::client::{Client, Response};
use crate::error::Result;
use crate::form::Form;
use crate::url::ClientUrl;

/// An outgoing request, fully resolved (method, target URL, headers,
/// body) and ready to encode onto the wire.
#[derive(Clone, Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: ClientUrl,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub unix_socket: Option<String>,
}

impl OutgoingRequest {
    pub fn new(method: Method, url: ClientUrl) -> Self {
        OutgoingRequest { method, url, headers: Headers::new(), body: Vec::new(), unix_socket: None }
    }

    pub fn set_content(&mut self, body: Vec<u8>, content_type: impl Into<String>) {
        self.headers.set("Content-Type", content_type.into());
        self.headers.set("Content-Length", body.len().to_string());
        self.body = body;
    }

    /// Encodes the request line and headers; the caller appends `body`
    /// separately when writing to the socket.
    pub fn encode_head(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(
            format!("{} {} HTTP/1.1\r\n", self.method.as_str(), self.url.request_target()).as_bytes(),
        );
        if !self.headers.contains("Host") {
            out.extend_from_slice(format!("Host: {}\r\n", self.url.host).as_bytes());
        }
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

/// Fluent request builder, grounded in `request_builder.hpp`'s chainable
/// `.header()/.headers()/.body()` setters plus terminal verb methods.
/// `download(path, ...)`'s filesystem-writing overload isn't carried over
/// here, for the same reason `Form::file()` stays buffer-only: it's a
/// thin disk-I/O convenience, not protocol logic — callers needing that
/// can drive [`Client::get_streaming`] themselves.
pub struct RequestBuilder<'a> {
    client: &'a Client,
    url: ClientUrl,
    headers: Headers,
    body: Vec<u8>,
    unix_socket: Option<String>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a Client, url: ClientUrl) -> Self {
        RequestBuilder { client, url, headers: Headers::new(), body: Vec::new(), unix_socket: None }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn headers(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        for (name, value) in pairs {
            self.headers.set(name, value);
        }
        self
    }

    pub fn body(mut self, content: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        let content = content.into();
        self.headers.set("Content-Type", content_type.into());
        self.headers.set("Content-Length", content.len().to_string());
        self.body = content;
        self
    }

    pub fn form(mut self, mut form: Form) -> Self {
        let content_type = form.content_type();
        self.body = form.body();
        self.headers.set("Content-Type", content_type);
        self.headers.set("Content-Length", self.body.len().to_string());
        self
    }

    /// Routes the request over a UNIX-domain socket instead of TCP,
    /// matching `http_client_base`'s unix-socket verb overloads.
    pub fn unix_socket(mut self, path: impl Into<String>) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    fn into_request(self, method: Method) -> OutgoingRequest {
        OutgoingRequest { method, url: self.url, headers: self.headers, body: self.body, unix_socket: self.unix_socket }
    }

    pub async fn get(self) -> Result<Response> {
        let client = self.client;
        client.execute(self.into_request(Method::Get)).await
    }

    pub async fn post(self) -> Result<Response> {
        let client = self.client;
        client.execute(self.into_request(Method::Post)).await
    }

    pub async fn put(self) -> Result<Response> {
        let client = self.client;
        client.execute(self.into_request(Method::Put)).await
    }

    pub async fn patch(self) -> Result<Response> {
        let client = self.client;
        client.execute(self.into_request(Method::Patch)).await
    }

    pub async fn delete(self) -> Result<Response> {
        let client = self.client;
        client.execute(self.into_request(Method::Delete)).await
    }

    pub async fn head(self) -> Result<Response> {
        let client = self.client;
        client.execute(self.into_request(Method::Head)).await
    }

    pub async fn options(self) -> Result<Response> {
        let client = self.client;
        client.execute(self.into_request(Method::Options)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_request_line_and_default_host_header() {
        let url = ClientUrl::parse("http://example.com/a/b?x=1").unwrap();
        let req = OutgoingRequest::new(Method::Get, url);
        let head = String::from_utf8(req.encode_head()).unwrap();
        assert!(head.starts_with("GET /a/b?x=1 HTTP/1.1\r\n"));
        assert!(head.contains("Host: example.com\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn set_content_sets_type_and_length_headers() {
        let url = ClientUrl::parse("http://example.com/").unwrap();
        let mut req = OutgoingRequest::new(Method::Post, url);
        req.set_content(b"hi".to_vec(), "text/plain");
        assert_eq!(req.headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(req.headers.get("Content-Length"), Some("2"));
    }

    #[test]
    fn explicit_host_header_is_not_overridden() {
        let url = ClientUrl::parse("http://example.com/").unwrap();
        let mut req = OutgoingRequest::new(Method::Get, url);
        req.headers.set("Host", "override.example");
        let head = String::from_utf8(req.encode_head()).unwrap();
        assert!(head.contains("Host: override.example\r\n"));
        assert_eq!(head.matches("Host:").count(), 1);
    }
}
