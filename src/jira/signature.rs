//! HMAC signature verification for inbound Jira webhooks.
//!
//! Two independent checks guard the webhook endpoint: a shared-secret
//! URL token and an HMAC signature over the raw request body. Both are
//! required. All failure modes return `false`; nothing here panics or
//! errors on attacker-controlled input.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Verify the HMAC signature header against the raw request body.
///
/// The header must be of the form `<algorithm>=<hex>` with a supported
/// algorithm (`sha256` or `sha512`). Returns `false` on a malformed
/// header, empty signature, empty secret, or unknown algorithm.
#[must_use]
pub fn verify(payload: &[u8], signature_header: &str, secret: &str) -> bool {
    if signature_header.is_empty() || secret.is_empty() {
        return false;
    }

    let Some((algorithm, provided)) = signature_header.split_once('=') else {
        return false;
    };
    if provided.is_empty() {
        return false;
    }

    let expected = match algorithm {
        "sha256" => {
            let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
                return false;
            };
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        "sha512" => {
            let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
                return false;
            };
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        _ => return false,
    };

    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

/// Verify the `secret` query parameter against the configured value.
///
/// Constant-time; `false` when either side is empty.
#[must_use]
pub fn verify_url_secret(provided: &str, expected: &str) -> bool {
    if provided.is_empty() || expected.is_empty() {
        return false;
    }
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

/// Constant-time byte comparison. Length mismatch short-circuits, which
/// leaks only the digest length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Compute the `sha256=<hex>` header value for a payload. Used by tests
/// and by operators generating webhook fixtures.
#[must_use]
pub fn sign_sha256(payload: &[u8], secret: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
