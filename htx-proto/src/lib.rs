//! HTTP/1.1 data model and wire codec: request/response heads, the
//! byte-at-a-time parsers (C5, C6), chunked transfer-coding, and
//! transparent gzip/deflate handling.

pub mod chunked;
pub mod compress;
mod error;
pub mod headers;
pub mod method;
pub mod request;
pub mod response;
pub mod uri;

pub use error::{ProtoError, Result};
pub use headers::Headers;
pub use method::Method;
pub use request::{RequestHead, RequestParser};
pub use response::{canonical_reason, encode_head, FeedOutcome, ResponseHead, ResponseParser};
pub use uri::Uri;
