//! Chunked transfer-coding decoder, shared between the response parser
//! (C6) and the server-side deferred body reader (C8) — the original has
//! two structurally identical chunk state machines (`response_factory`'s
//! `chunked_content*` states and `request.hpp`'s `chunk_state` enum); this
//! port keeps one implementation and reuses it from both call sites.
//!
//! States mirror `request.hpp`'s `chunk_state`: `size -> size_lf -> data ->
//! data_cr -> data_lf -> trailer_lf -> done`, with an extra `SizeExt` state
//! for the semicolon-delimited chunk-extension bytes, which are skipped
//! verbatim rather than validated (RFC 7230 §4.1.1 allows this, and the
//! original's own "skip byte" handling does the same).

use htx_errors::ParseError;

use crate::error::{ProtoError, Result};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Size,
    SizeExt,
    SizeCr,
    Data,
    DataCr,
    DataLf,
    TrailerStart,
    TrailerLine,
    TrailerLineLf,
    TrailerEndLf,
    Done,
}

pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
    size_acc: u64,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        ChunkedDecoder {
            state: State::Size,
            remaining: 0,
            size_acc: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Decode as much of `input` as possible, appending decoded payload
    /// bytes to `out`. Returns the number of input bytes consumed; once
    /// [`is_done`](Self::is_done), further calls consume nothing.
    pub fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize> {
        let mut i = 0;
        while i < input.len() && self.state != State::Done {
            if self.state == State::Data {
                let take = self.remaining.min((input.len() - i) as u64) as usize;
                out.extend_from_slice(&input[i..i + take]);
                self.remaining -= take as u64;
                i += take;
                if self.remaining == 0 {
                    self.state = State::DataCr;
                }
                continue;
            }

            let byte = input[i];
            i += 1;
            match self.state {
                State::Size => match byte {
                    b'0'..=b'9' => self.size_acc = self.size_acc * 16 + (byte - b'0') as u64,
                    b'a'..=b'f' => self.size_acc = self.size_acc * 16 + (byte - b'a' + 10) as u64,
                    b'A'..=b'F' => self.size_acc = self.size_acc * 16 + (byte - b'A' + 10) as u64,
                    b';' => self.state = State::SizeExt,
                    b'\r' => self.state = State::SizeCr,
                    _ => return Err(invalid_framing()),
                },
                State::SizeExt => {
                    if byte == b'\r' {
                        self.state = State::SizeCr;
                    }
                    // Extension bytes themselves are skipped verbatim.
                }
                State::SizeCr => {
                    if byte != b'\n' {
                        return Err(invalid_framing());
                    }
                    self.remaining = self.size_acc;
                    self.size_acc = 0;
                    self.state = if self.remaining == 0 { State::TrailerStart } else { State::Data };
                }
                State::DataCr => {
                    if byte != b'\r' {
                        return Err(invalid_framing());
                    }
                    self.state = State::DataLf;
                }
                State::DataLf => {
                    if byte != b'\n' {
                        return Err(invalid_framing());
                    }
                    self.state = State::Size;
                }
                State::TrailerStart => {
                    self.state = if byte == b'\r' { State::TrailerEndLf } else { State::TrailerLine };
                }
                State::TrailerLine => {
                    if byte == b'\r' {
                        self.state = State::TrailerLineLf;
                    }
                }
                State::TrailerLineLf => {
                    if byte != b'\n' {
                        return Err(invalid_framing());
                    }
                    self.state = State::TrailerStart;
                }
                State::TrailerEndLf => {
                    if byte != b'\n' {
                        return Err(invalid_framing());
                    }
                    self.state = State::Done;
                }
                State::Data | State::Done => unreachable!("handled above"),
            }
        }
        Ok(i)
    }
}

fn invalid_framing() -> ProtoError {
    ProtoError::Parse(ParseError::InvalidChunkFraming)
}

/// Encode `payload` as one chunk: hex length, CRLF, payload, CRLF.
pub fn encode_chunk(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 16);
    out.extend_from_slice(format!("{:x}\r\n", payload.len()).as_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
    out
}

/// The terminal zero-length chunk, with no trailers.
pub fn encode_final_chunk() -> Vec<u8> {
    b"0\r\n\r\n".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_chunk_then_terminator() {
        let mut decoder = ChunkedDecoder::new();
        let mut out = Vec::new();
        let input = b"5\r\nhello\r\n0\r\n\r\n";
        let consumed = decoder.feed(input, &mut out).unwrap();
        assert_eq!(consumed, input.len());
        assert!(decoder.is_done());
        assert_eq!(out, b"hello");
    }

    #[test]
    fn decodes_across_multiple_chunks_and_feed_calls() {
        let mut decoder = ChunkedDecoder::new();
        let mut out = Vec::new();
        decoder.feed(b"3\r\nfoo\r\n", &mut out).unwrap();
        decoder.feed(b"3\r\nbar\r\n", &mut out).unwrap();
        decoder.feed(b"0\r\n\r\n", &mut out).unwrap();
        assert!(decoder.is_done());
        assert_eq!(out, b"foobar");
    }

    #[test]
    fn ignores_chunk_extensions_and_trailers() {
        let mut decoder = ChunkedDecoder::new();
        let mut out = Vec::new();
        let input = b"4;foo=bar\r\ndata\r\n0\r\nX-Trailer: ignored\r\n\r\n";
        decoder.feed(input, &mut out).unwrap();
        assert!(decoder.is_done());
        assert_eq!(out, b"data");
    }

    #[test]
    fn rejects_bad_framing() {
        let mut decoder = ChunkedDecoder::new();
        let mut out = Vec::new();
        assert!(decoder.feed(b"not-hex\r\n", &mut out).is_err());
    }
}
