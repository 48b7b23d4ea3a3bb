// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-SHA256 body signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use switchboard_core::SwitchboardError;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
pub fn sign(body: &[u8], secret: &str) -> Result<String, SwitchboardError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SwitchboardError::Internal(format!("invalid webhook secret: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hex signature produced by [`sign`].
pub fn verify(body: &[u8], secret: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2.
        let sig = sign(b"what do ya want for nothing?", "Jefe").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_round_trip_and_tamper() {
        let sig = sign(b"{\"event\":\"message\"}", "s3cret").unwrap();
        assert!(verify(b"{\"event\":\"message\"}", "s3cret", &sig));
        assert!(!verify(b"{\"event\":\"status\"}", "s3cret", &sig));
        assert!(!verify(b"{\"event\":\"message\"}", "other", &sig));
        assert!(!verify(b"{}", "s3cret", "not-hex"));
    }
}
