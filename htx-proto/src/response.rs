//! Response head (§3) and the byte-at-a-time response parser (C6).
//!
//! Head states mirror `response_factory.hpp`'s `enum state` up through
//! `expecting_newline_3`; body handling reuses [`crate::chunked`] instead
//! of reimplementing the header's separate `chunked_content_size`/
//! `chunked_content` states, and length-delimited bodies batch-copy the
//! way `response_factory`'s streaming fast path does rather than consuming
//! one byte at a time.

use htx_errors::ParseError;

use crate::chunked::ChunkedDecoder;
use crate::error::{ProtoError, Result};
use crate::headers::Headers;

pub const MAX_CONTENT_SIZE: usize = 8 * 1024 * 1024;
pub const MAX_HEADERS_SIZE: usize = 8 * 1024;

#[derive(Clone, Debug)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub version_major: u8,
    pub version_minor: u8,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl ResponseHead {
    pub fn keep_alive(&self) -> bool {
        self.headers.keep_alive(self.version_major, self.version_minor)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    VersionH,
    VersionT1,
    VersionT2,
    VersionP,
    VersionSlash,
    VersionMajorStart,
    VersionMajor,
    VersionMinorStart,
    VersionMinor,
    StatusCode,
    ReasonPhrase,
    ExpectingNewline1,
    HeaderLineStart,
    HeaderLws,
    HeaderName,
    SpaceBeforeHeaderValue,
    HeaderValue,
    ExpectingNewline2,
    ExpectingNewline3,
    Body,
    Done,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum BodyMode {
    None,
    LengthDelimited(u64),
    Chunked,
}

pub enum FeedOutcome {
    NeedMore,
    Complete,
    /// The caller's streaming callback returned `false`.
    Aborted,
}

/// Incremental response parser, reusable across responses on a pooled
/// connection via [`ResponseParser::reset`].
pub struct ResponseParser {
    state: State,
    head_request: bool,
    max_headers_size: usize,
    max_body_size: usize,

    tmp1: String,
    tmp2: String,
    tmp_version: u16,
    tmp_status: u16,
    headers_size: usize,

    status: u16,
    reason: String,
    version_major: u8,
    version_minor: u8,
    headers: Headers,

    body_mode: BodyMode,
    remaining: u64,
    downloaded: u64,
    chunked: ChunkedDecoder,
    body: Vec<u8>,
}

impl ResponseParser {
    pub fn new(head_request: bool) -> Self {
        Self::with_limits(head_request, MAX_HEADERS_SIZE, MAX_CONTENT_SIZE)
    }

    pub fn with_limits(head_request: bool, max_headers_size: usize, max_body_size: usize) -> Self {
        ResponseParser {
            state: State::VersionH,
            head_request,
            max_headers_size,
            max_body_size,
            tmp1: String::new(),
            tmp2: String::new(),
            tmp_version: 0,
            tmp_status: 0,
            headers_size: 0,
            status: 0,
            reason: String::new(),
            version_major: 0,
            version_minor: 0,
            headers: Headers::new(),
            body_mode: BodyMode::None,
            remaining: 0,
            downloaded: 0,
            chunked: ChunkedDecoder::new(),
            body: Vec::new(),
        }
    }

    /// Feed `buf`, accumulating any body into memory (non-streaming path).
    pub fn feed(&mut self, buf: &[u8]) -> Result<(usize, bool)> {
        let mut accumulated = std::mem::take(&mut self.body);
        let result = self.feed_streaming(buf, |chunk, _downloaded, _total| {
            accumulated.extend_from_slice(chunk);
            true
        });
        self.body = accumulated;
        let (consumed, outcome) = result?;
        Ok((consumed, matches!(outcome, FeedOutcome::Complete)))
    }

    /// Feed `buf`, invoking `on_chunk(data, downloaded_so_far, total_or_zero)`
    /// for every batch of body bytes instead of accumulating them — the
    /// streaming download path (§4.6). `total_or_zero` is 0 for chunked
    /// responses. Returning `false` aborts the parse.
    pub fn feed_streaming(
        &mut self,
        buf: &[u8],
        mut on_chunk: impl FnMut(&[u8], u64, u64) -> bool,
    ) -> Result<(usize, FeedOutcome)> {
        let mut i = 0;
        while i < buf.len() {
            match self.state {
                State::Body => {
                    let (consumed, outcome) = self.feed_body(&buf[i..], &mut on_chunk)?;
                    i += consumed;
                    match outcome {
                        FeedOutcome::NeedMore => {}
                        other => return Ok((i, other)),
                    }
                }
                State::Done => return Ok((i, FeedOutcome::Complete)),
                _ => {
                    let done = self.consume_head_byte(buf[i])?;
                    i += 1;
                    if done && self.state == State::Done {
                        return Ok((i, FeedOutcome::Complete));
                    }
                }
            }
        }
        Ok((i, FeedOutcome::NeedMore))
    }

    fn feed_body(
        &mut self,
        buf: &[u8],
        on_chunk: &mut impl FnMut(&[u8], u64, u64) -> bool,
    ) -> Result<(usize, FeedOutcome)> {
        match self.body_mode {
            BodyMode::None => {
                self.state = State::Done;
                Ok((0, FeedOutcome::Complete))
            }
            BodyMode::LengthDelimited(total) => {
                let take = self.remaining.min(buf.len() as u64) as usize;
                self.downloaded += take as u64;
                if !on_chunk(&buf[..take], self.downloaded, total) {
                    return Ok((take, FeedOutcome::Aborted));
                }
                self.remaining -= take as u64;
                if self.remaining == 0 {
                    self.state = State::Done;
                    return Ok((take, FeedOutcome::Complete));
                }
                Ok((take, FeedOutcome::NeedMore))
            }
            BodyMode::Chunked => {
                let mut scratch = Vec::new();
                let consumed = self.chunked.feed(buf, &mut scratch)?;
                if !scratch.is_empty() {
                    self.downloaded += scratch.len() as u64;
                    if !on_chunk(&scratch, self.downloaded, 0) {
                        return Ok((consumed, FeedOutcome::Aborted));
                    }
                }
                if self.chunked.is_done() {
                    self.state = State::Done;
                    return Ok((consumed, FeedOutcome::Complete));
                }
                Ok((consumed, FeedOutcome::NeedMore))
            }
        }
    }

    /// Status code parsed so far, without consuming the parser. Lets a
    /// streaming download report a status code before the body (and thus
    /// `take()`) is available, matching `response_factory::get_status_code`.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn take(&mut self) -> ResponseHead {
        let head = ResponseHead {
            status: self.status,
            reason: std::mem::take(&mut self.reason),
            version_major: self.version_major,
            version_minor: self.version_minor,
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
        };
        self.reset();
        head
    }

    pub fn reset(&mut self) {
        *self = ResponseParser::with_limits(self.head_request, self.max_headers_size, self.max_body_size);
    }

    fn consume_head_byte(&mut self, input: u8) -> Result<bool> {
        match self.state {
            State::VersionH => self.expect_literal(input, b'H', State::VersionT1),
            State::VersionT1 => self.expect_literal(input, b'T', State::VersionT2),
            State::VersionT2 => self.expect_literal(input, b'T', State::VersionP),
            State::VersionP => self.expect_literal(input, b'P', State::VersionSlash),
            State::VersionSlash => self.expect_literal(input, b'/', State::VersionMajorStart),
            State::VersionMajorStart => self.digit_start(input, State::VersionMajor),
            State::VersionMajor => {
                if input == b'.' {
                    self.version_major = self.tmp_version as u8;
                    self.tmp_version = 0;
                    self.state = State::VersionMinorStart;
                    Ok(false)
                } else if input.is_ascii_digit() {
                    self.tmp_version = self.tmp_version * 10 + (input - b'0') as u16;
                    Ok(false)
                } else {
                    Err(malformed())
                }
            }
            State::VersionMinorStart => self.digit_start(input, State::VersionMinor),
            State::VersionMinor => {
                if input.is_ascii_digit() {
                    self.tmp_version = self.tmp_version * 10 + (input - b'0') as u16;
                    Ok(false)
                } else if input == b' ' {
                    self.version_minor = self.tmp_version as u8;
                    self.state = State::StatusCode;
                    Ok(false)
                } else {
                    Err(malformed())
                }
            }
            State::StatusCode => {
                if input.is_ascii_digit() {
                    self.tmp_status = self.tmp_status * 10 + (input - b'0') as u16;
                    Ok(false)
                } else if input == b' ' {
                    self.status = self.tmp_status;
                    self.state = State::ReasonPhrase;
                    Ok(false)
                } else {
                    Err(malformed())
                }
            }
            State::ReasonPhrase => {
                if input == b'\r' {
                    self.reason = std::mem::take(&mut self.tmp1);
                    self.state = State::ExpectingNewline1;
                } else {
                    self.tmp1.push(input as char);
                }
                Ok(false)
            }
            State::ExpectingNewline1 => {
                if input == b'\n' {
                    self.state = State::HeaderLineStart;
                    Ok(false)
                } else {
                    Err(malformed())
                }
            }
            State::HeaderLineStart => {
                if input == b'\r' {
                    self.state = State::ExpectingNewline3;
                } else if !self.headers.is_empty() && (input == b' ' || input == b'\t') {
                    self.state = State::HeaderLws;
                } else {
                    self.tmp1.clear();
                    self.tmp1.push(input as char);
                    self.state = State::HeaderName;
                }
                Ok(false)
            }
            State::HeaderLws => {
                if input == b'\r' {
                    self.state = State::ExpectingNewline2;
                } else if input == b' ' || input == b'\t' {
                    // continuation whitespace, discarded
                } else {
                    self.state = State::HeaderValue;
                    self.tmp1.push(input as char);
                }
                Ok(false)
            }
            State::HeaderName => {
                if input == b':' {
                    self.state = State::SpaceBeforeHeaderValue;
                } else {
                    self.tmp1.push(input as char);
                }
                self.track_header_size()?;
                Ok(false)
            }
            State::SpaceBeforeHeaderValue => {
                if input == b' ' {
                    self.tmp2.clear();
                    self.state = State::HeaderValue;
                    Ok(false)
                } else {
                    Err(malformed())
                }
            }
            State::HeaderValue => {
                if input == b'\r' {
                    self.headers.push(std::mem::take(&mut self.tmp1), std::mem::take(&mut self.tmp2));
                    self.state = State::ExpectingNewline2;
                } else {
                    self.tmp2.push(input as char);
                    self.track_header_size()?;
                }
                Ok(false)
            }
            State::ExpectingNewline2 => {
                if input == b'\n' {
                    self.state = State::HeaderLineStart;
                    Ok(false)
                } else {
                    Err(malformed())
                }
            }
            State::ExpectingNewline3 => {
                if input != b'\n' {
                    return Err(malformed());
                }
                self.finish_headers()?;
                Ok(true)
            }
            State::Body | State::Done => Ok(true),
        }
    }

    fn finish_headers(&mut self) -> Result<()> {
        if self.head_request {
            self.body_mode = BodyMode::None;
            self.state = State::Done;
            return Ok(());
        }
        if self.headers.is_chunked() {
            self.body_mode = BodyMode::Chunked;
            self.state = State::Body;
        } else {
            let len = self.headers.content_length();
            if len as usize > self.max_body_size {
                return Err(ProtoError::Parse(ParseError::BodyTooLarge));
            }
            if len == 0 {
                self.body_mode = BodyMode::None;
                self.state = State::Done;
            } else {
                self.body_mode = BodyMode::LengthDelimited(len);
                self.remaining = len;
                self.state = State::Body;
            }
        }
        Ok(())
    }

    fn expect_literal(&mut self, input: u8, expected: u8, next: State) -> Result<bool> {
        if input == expected {
            self.state = next;
            Ok(false)
        } else {
            Err(malformed())
        }
    }

    fn digit_start(&mut self, input: u8, next: State) -> Result<bool> {
        if input.is_ascii_digit() {
            self.tmp_version = (input - b'0') as u16;
            self.state = next;
            Ok(false)
        } else {
            Err(malformed())
        }
    }

    fn track_header_size(&mut self) -> Result<()> {
        self.headers_size += 1;
        if self.headers_size > self.max_headers_size {
            return Err(ProtoError::Parse(ParseError::HeadersTooLarge));
        }
        Ok(())
    }
}

fn malformed() -> ProtoError {
    ProtoError::Parse(ParseError::MalformedHead)
}

/// Serializes a status line plus headers into wire bytes, grounded in
/// `http_response::to_buffer`. The caller appends the body (if any)
/// separately rather than copying it into this buffer.
pub fn encode_head(status: u16, reason: &str, headers: &Headers) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(format!("HTTP/1.1 {status} {reason}\r\n").as_bytes());
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Canonical reason phrase for a status code, used when a response is
/// built without an explicit override.
pub fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        101 => "Switching Protocols",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_head_round_trips_through_the_parser() {
        let mut headers = Headers::new();
        headers.push("Content-Type", "text/plain");
        headers.push("Content-Length", "2");
        let mut wire = encode_head(200, "OK", &headers);
        wire.extend_from_slice(b"hi");

        let mut parser = ResponseParser::new(false);
        let (consumed, complete) = parser.feed(&wire).unwrap();
        assert!(complete);
        assert_eq!(consumed, wire.len());
        let head = parser.take();
        assert_eq!(head.status, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(head.body, b"hi");
    }

    #[test]
    fn status_is_readable_before_the_body_completes() {
        let mut parser = ResponseParser::new(false);
        let (_, complete) = parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc").unwrap();
        assert!(!complete);
        assert_eq!(parser.status(), 200);
    }

    #[test]
    fn parses_length_delimited_response() {
        let mut parser = ResponseParser::new(false);
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let (consumed, complete) = parser.feed(raw).unwrap();
        assert!(complete);
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn head_request_has_no_body_regardless_of_headers() {
        let mut parser = ResponseParser::new(true);
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n";
        let (consumed, complete) = parser.feed(raw).unwrap();
        assert!(complete);
        assert_eq!(consumed, raw.len());
        let head = parser.take();
        assert!(head.body.is_empty());
    }

    #[test]
    fn parses_chunked_response() {
        let mut parser = ResponseParser::new(false);
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        let (consumed, complete) = parser.feed(raw).unwrap();
        assert!(complete);
        assert_eq!(consumed, raw.len());
        let head = parser.take();
        assert_eq!(head.body, b"hello");
    }

    #[test]
    fn streaming_callback_can_abort() {
        let mut parser = ResponseParser::new(false);
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabcdefghij";
        let (_, outcome) = parser.feed_streaming(raw, |_, _, _| false).unwrap();
        assert!(matches!(outcome, FeedOutcome::Aborted));
    }
}
