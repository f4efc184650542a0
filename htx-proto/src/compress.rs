//! Transparent `Content-Encoding: gzip`/`deflate` handling (§3 invariant:
//! "Content-Encoding gzip and deflate are transparently decoded on
//! receive; the header is stripped once applied").
//!
//! The original hand-rolls zlib calls directly; this port uses `flate2`,
//! the crate several repos in the pack reach for the same job (e.g.
//! `denoland-deno`, `argan-rs-argan`).

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;

use crate::error::{ProtoError, Result};

pub fn decode(encoding: &str, body: &[u8]) -> Result<Vec<u8>> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" => {
            let mut out = Vec::new();
            GzDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(|e| ProtoError::Decompress(e.to_string()))?;
            Ok(out)
        }
        "deflate" => {
            let mut out = Vec::new();
            DeflateDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(|e| ProtoError::Decompress(e.to_string()))?;
            Ok(out)
        }
        other => Err(ProtoError::Decompress(format!("unsupported content-encoding: {other}"))),
    }
}

pub fn encode(encoding: &str, body: &[u8]) -> Result<Vec<u8>> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" => {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(body).map_err(|e| ProtoError::Decompress(e.to_string()))?;
            enc.finish().map_err(|e| ProtoError::Decompress(e.to_string()))
        }
        "deflate" => {
            let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
            enc.write_all(body).map_err(|e| ProtoError::Decompress(e.to_string()))?;
            enc.finish().map_err(|e| ProtoError::Decompress(e.to_string()))
        }
        other => Err(ProtoError::Decompress(format!("unsupported content-encoding: {other}"))),
    }
}

/// The minimum body size the response builder bothers compressing (§4.8:
/// "body >= 200 bytes").
pub const MIN_COMPRESSIBLE_SIZE: usize = 200;

/// MIME types the response builder considers worth compressing: text,
/// JSON, XML, JS, SVG.
pub fn is_compressible_mime(content_type: &str) -> bool {
    let base = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    base.starts_with("text/")
        || matches!(
            base.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/x-javascript"
                | "image/svg+xml"
        )
}

/// Picks the best encoding offered by an `Accept-Encoding` header, among
/// the ones this crate supports, or `None` if the peer accepts neither.
pub fn negotiate<'a>(accept_encoding: &'a str, supported: &[&'a str]) -> Option<&'a str> {
    accept_encoding
        .split(',')
        .map(|tok| tok.split(';').next().unwrap_or("").trim())
        .find(|tok| supported.contains(tok))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_gzip() {
        let body = b"hello hello hello hello hello hello";
        let compressed = encode("gzip", body).unwrap();
        let decoded = decode("gzip", &compressed).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn round_trips_deflate() {
        let body = b"hello hello hello hello hello hello";
        let compressed = encode("deflate", body).unwrap();
        let decoded = decode("deflate", &compressed).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn compressible_mime_covers_text_and_json_not_binary() {
        assert!(is_compressible_mime("text/html; charset=utf-8"));
        assert!(is_compressible_mime("application/json"));
        assert!(!is_compressible_mime("image/png"));
    }

    #[test]
    fn negotiate_picks_first_supported() {
        assert_eq!(negotiate("br, gzip, deflate", &["gzip", "deflate"]), Some("gzip"));
        assert_eq!(negotiate("br", &["gzip", "deflate"]), None);
    }
}
