//! Handshake accept-key computation, grounded in
//! `websocket_util.{hpp,cpp}`'s `WS_GUID`-concatenation-then-SHA1-then-
//! base64 scheme, using the `sha1`/`base64` crates (the same pair
//! `gel-frontend` reaches for) instead of the original's hand-rolled
//! `util::sha1`/`util::base64`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use sha1::{Digest, Sha1};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// 16 random bytes, base64-encoded, for the client's `Sec-WebSocket-Key`.
pub fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// `base64(sha1(key + WS_GUID))`, computed for both the server's response
/// and the client's verification of it.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

pub fn validate_accept_key(accept: &str, sent_key: &str) -> bool {
    accept == accept_key(sent_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_rfc6455_worked_example() {
        // RFC 6455 §1.3's worked example.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn validates_matching_key_only() {
        let key = generate_key();
        let accept = accept_key(&key);
        assert!(validate_accept_key(&accept, &key));
        assert!(!validate_accept_key(&accept, "different-key"));
    }
}
