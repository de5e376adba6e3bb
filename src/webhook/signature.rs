//! Webhook signature verification.
//!
//! The call platform signs each delivery with HMAC-SHA256 over the raw body,
//! hex-encoded in the `x-signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

/// Verify a signature header against the raw request body.
pub fn verify(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Compute the hex signature for a body. Used by tests and local tooling.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let body = br#"{"type":"call.session_started"}"#;
        let sig = sign("topsecret", body);
        assert!(verify("topsecret", body, &sig));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let sig = sign("topsecret", body);
        assert!(!verify("other", body, &sig));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let sig = sign("topsecret", b"payload");
        assert!(!verify("topsecret", b"payload2", &sig));
    }

    #[test]
    fn test_garbage_header_rejected() {
        assert!(!verify("topsecret", b"payload", "not-hex!"));
        assert!(!verify("topsecret", b"payload", ""));
    }

    #[test]
    fn test_header_whitespace_tolerated() {
        let body = b"payload";
        let sig = format!(" {}\n", sign("topsecret", body));
        assert!(verify("topsecret", body, &sig));
    }
}
