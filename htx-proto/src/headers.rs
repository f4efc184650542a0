//! Ordered header list (§3 "Request head"/"Response head": name preserves
//! case as received; comparison is ASCII-case-insensitive) plus the parsed
//! attributes C5/C6 derive from it (`Connection`, `Accept`, `Content-Length`).

use std::fmt;

/// An ordered sequence of header name/value pairs. Lookups are
/// case-insensitive; insertion order and original casing are preserved.
#[derive(Clone, Debug, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replace every existing occurrence of `name` with a single entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.0.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// First value matching `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value matching `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Content-Length`, lexically parsed; malformed values read as 0,
    /// matching `request.hpp`'s lenient `get_content_length()`.
    pub fn content_length(&self) -> u64 {
        self.get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// `Transfer-Encoding: chunked` (case-insensitive, trailing token).
    pub fn is_chunked(&self) -> bool {
        self.get_all("Transfer-Encoding")
            .flat_map(|v| v.split(','))
            .any(|tok| tok.trim().eq_ignore_ascii_case("chunked"))
    }

    /// `Connection` may list both `keep-alive` and `upgrade`; each token is
    /// compared independently.
    fn connection_tokens(&self) -> impl Iterator<Item = String> + '_ {
        self.get_all("Connection")
            .flat_map(|v| v.split(','))
            .map(|tok| tok.trim().to_ascii_lowercase())
    }

    pub fn has_connection_token(&self, token: &str) -> bool {
        self.connection_tokens().any(|t| t == token)
    }

    pub fn is_upgrade(&self) -> bool {
        self.has_connection_token("upgrade") && self.get("Upgrade").is_some()
    }

    pub fn wants_event_stream(&self) -> bool {
        self.get_all("Accept")
            .flat_map(|v| v.split(','))
            .any(|tok| tok.trim().eq_ignore_ascii_case("text/event-stream"))
    }

    /// Resolved keep-alive tri-state: explicit `Connection: close`/`keep-alive`
    /// wins; absent the header, HTTP/1.1 defaults to keep-alive and HTTP/1.0
    /// defaults to close.
    pub fn keep_alive(&self, major: u8, minor: u8) -> bool {
        if self.has_connection_token("close") {
            return false;
        }
        if self.has_connection_token("keep-alive") {
            return true;
        }
        (major, minor) >= (1, 1)
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.get("Content-Encoding")
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.0 {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}
