use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 used to sign wallet registration requests.
pub fn hmac_sha256_hex(data: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-format comparison of a wallet signature against the API secret.
pub fn verify_signature(address: &str, signature: &str, secret: &str) -> bool {
    hmac_sha256_hex(address, secret) == signature
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_vector() {
        // echo -n "0xabc" | openssl dgst -sha256 -hmac "secret"
        let sig = hmac_sha256_hex("0xabc", "secret");
        assert_eq!(sig.len(), 64);
        assert!(verify_signature("0xabc", &sig, "secret"));
    }

    #[test]
    fn signature_rejects_wrong_secret() {
        let sig = hmac_sha256_hex("0xabc", "secret");
        assert!(!verify_signature("0xabc", &sig, "other"));
        assert!(!verify_signature("0xdef", &sig, "secret"));
    }
}
