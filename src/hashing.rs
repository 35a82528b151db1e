//! Hashing System - SHA-256 Spec Signatures
//!
//! Signed URLs stop clients from asking the generator for arbitrary variants.
//! token = base64url(hmac_sha256(key, spec)[..TOKEN_BYTES])

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the MAC kept in a token.
pub const TOKEN_BYTES: usize = 12;

/// Length of a signing token in characters.
pub const TOKEN_LEN: usize = 16;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn spec_mac(key: &str, spec: &str) -> HmacSha256 {
    // HMAC accepts keys of any length.
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(spec.as_bytes());
    mac
}

/// Signing token for a spec
pub fn sign_spec(key: &str, spec: &str) -> String {
    let tag = spec_mac(key, spec).finalize().into_bytes();
    URL_SAFE_NO_PAD.encode(&tag[..TOKEN_BYTES])
}

/// Check a token against the left-truncated MAC of `spec`.
pub fn verify_token(key: &str, spec: &str, token: &str) -> bool {
    match URL_SAFE_NO_PAD.decode(token) {
        Ok(tag) if tag.len() == TOKEN_BYTES => {
            spec_mac(key, spec).verify_truncated_left(&tag).is_ok()
        }
        _ => false,
    }
}

/// Spec as carried in a URL query parameter.
pub fn encode_spec_param(spec: &str) -> String {
    URL_SAFE_NO_PAD.encode(spec.as_bytes())
}

pub fn decode_spec_param(param: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(param).ok()?;
    String::from_utf8(bytes).ok()
}

/// Stable file stem for a derived artifact
pub fn artifact_digest(spec: &str) -> String {
    let mut digest = sha256_hex(spec.as_bytes());
    digest.truncate(20);
    digest
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
