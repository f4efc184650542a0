//! Absolute URL parsing for outgoing requests.
//!
//! `original_source/` has no `common/http_request.{hpp,cpp}` in the
//! filtered pack — the file is referenced by `request_builder.hpp` and
//! `client_connection.cpp` but was not retrieved, so there is no literal
//! client-side URL struct to port. This is grounded instead on
//! `websocket_util.hpp`'s `url_components`/`parse_websocket_url` (which
//! the pack does carry in full) generalized from `ws`/`wss` to
//! `http`/`https`: same `scheme://host[:port]/path[?query]` grammar, same
//! four fields, with `secure` derived from the scheme instead of being
//! websocket-specific.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{ClientError, Result};

const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');
const PATH_SEGMENT: &AsciiSet = &FRAGMENT.add(b'#').add(b'?').add(b'{').add(b'}');

/// An absolute HTTP(S) URL, decomposed the way a client needs it: enough
/// to pick a [`htx_transport::Target`] and to build a request line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientUrl {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
}

impl ClientUrl {
    pub fn parse(raw: &str) -> Result<ClientUrl> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| ClientError::InvalidUrl(raw.to_string()))?;
        let secure = match scheme {
            "http" | "ws" => false,
            "https" | "wss" => true,
            other => return Err(ClientError::InvalidUrl(format!("unsupported scheme: {other}"))),
        };

        let (authority, path_and_query) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(ClientError::InvalidUrl(raw.to_string()));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port = p.parse::<u16>().map_err(|_| ClientError::InvalidUrl(raw.to_string()))?;
                (h.to_string(), port)
            }
            None => (authority.to_string(), if secure { 443 } else { 80 }),
        };

        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path_and_query.to_string(), None),
        };
        let path = if path.is_empty() { "/".to_string() } else { path };

        Ok(ClientUrl { secure, host, port, path, query })
    }

    /// The request-target to put on the request line: path plus `?query`.
    pub fn request_target(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    /// `scheme://host[:port]`, used for same-origin checks on redirect
    /// (§4.12's `Authorization` header preservation rule).
    pub fn origin(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            format!("{}://{}", if self.secure { "https" } else { "http" }, self.host)
        } else {
            format!("{}://{}:{}", if self.secure { "https" } else { "http" }, self.host, self.port)
        }
    }

    /// Resolves a `Location` header against this URL: absolute locations
    /// are parsed as-is, relative ones (path-only or path+query) keep this
    /// URL's scheme/host/port.
    pub fn resolve(&self, location: &str) -> Result<ClientUrl> {
        if location.contains("://") {
            return ClientUrl::parse(location);
        }
        let (path, query) = match location.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (location.to_string(), None),
        };
        let path = if path.starts_with('/') { path } else { format!("{}/{path}", parent(&self.path)) };
        Ok(ClientUrl { secure: self.secure, host: self.host.clone(), port: self.port, path, query })
    }
}

fn parent(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((p, _)) => p.to_string(),
        None => String::new(),
    }
}

/// Percent-encodes a value for use in a `x-www-form-urlencoded` body,
/// grounded in `form.hpp`'s `url_encode`.
pub fn url_encode(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string().replace("%20", "+")
}

/// Decodes a `x-www-form-urlencoded` value, grounded in `form.hpp`'s
/// `url_decode`.
pub fn url_decode(value: &str) -> String {
    percent_decode_str(&value.replace('+', " ")).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_host_port_path_query() {
        let url = ClientUrl::parse("https://example.com:8443/a/b?x=1").unwrap();
        assert!(url.secure);
        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, 8443);
        assert_eq!(url.path, "/a/b");
        assert_eq!(url.query.as_deref(), Some("x=1"));
    }

    #[test]
    fn defaults_port_by_scheme() {
        assert_eq!(ClientUrl::parse("http://example.com/").unwrap().port, 80);
        assert_eq!(ClientUrl::parse("https://example.com/").unwrap().port, 443);
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(ClientUrl::parse("example.com/path").is_err());
    }

    #[test]
    fn resolves_relative_redirect_against_origin() {
        let base = ClientUrl::parse("https://example.com/a/b").unwrap();
        let next = base.resolve("/c?d=1").unwrap();
        assert_eq!(next.host, "example.com");
        assert_eq!(next.path, "/c");
        assert_eq!(next.query.as_deref(), Some("d=1"));
    }

    #[test]
    fn resolves_absolute_redirect_to_new_origin() {
        let base = ClientUrl::parse("https://example.com/a").unwrap();
        let next = base.resolve("http://other.example/x").unwrap();
        assert_eq!(next.host, "other.example");
        assert!(!next.secure);
    }

    #[test]
    fn url_encode_round_trips_space_and_special_chars() {
        let encoded = url_encode("a b&c");
        assert_eq!(url_decode(&encoded), "a b&c");
    }

    #[test]
    fn origin_omits_default_port_only() {
        assert_eq!(ClientUrl::parse("https://example.com/").unwrap().origin(), "https://example.com");
        assert_eq!(ClientUrl::parse("https://example.com:8443/").unwrap().origin(), "https://example.com:8443");
    }
}
