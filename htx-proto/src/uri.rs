//! Request URI: path plus a percent-decoded, non-unique-key query map.
//!
//! Grounded in `request_factory.cpp`'s `uri` state (URI must be
//! non-empty, start with `/`, and not contain `..` after decoding) and in
//! `url::url_decode` for percent-decoding, done here with the `percent-encoding`
//! crate instead of hand-rolled hex parsing.

use percent_encoding::percent_decode_str;

use crate::error::{ProtoError, Result};

#[derive(Clone, Debug, Default)]
pub struct Uri {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Uri {
    /// Parse and validate a raw request-target. `raw` is the exact bytes
    /// between the method and the HTTP version on the request line,
    /// pre-percent-decoding.
    pub fn parse(raw: &str) -> Result<Uri> {
        let (path_enc, query_enc) = match raw.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (raw, None),
        };

        let path = percent_decode_str(path_enc)
            .decode_utf8()
            .map_err(|_| ProtoError::Parse(htx_errors::ParseError::MalformedHead))?
            .into_owned();

        if path.is_empty() || !path.starts_with('/') || path.contains("..") {
            return Err(ProtoError::Parse(htx_errors::ParseError::MalformedHead));
        }

        let query = query_enc.map(parse_query).unwrap_or_default();
        Ok(Uri { path, query })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| {
                percent_decode_str(&s.replace('+', " "))
                    .decode_utf8_lossy()
                    .into_owned()
            };
            (decode(k), decode(v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dotdot_and_relative_paths() {
        assert!(Uri::parse("/a/../b").is_err());
        assert!(Uri::parse("relative").is_err());
        assert!(Uri::parse("").is_err());
    }

    #[test]
    fn decodes_query_pairs() {
        let uri = Uri::parse("/search?q=hello%20world&tag=a&tag=b").unwrap();
        assert_eq!(uri.path, "/search");
        assert_eq!(uri.get("q"), Some("hello world"));
        assert_eq!(uri.query.iter().filter(|(k, _)| k == "tag").count(), 2);
    }
}
