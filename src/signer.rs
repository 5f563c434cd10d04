//! HMAC-SHA256 payload signing.
//!
//! Receivers verify `X-Relay-Signature: sha256=<hex>` against the raw
//! request body and their copy of the endpoint secret. This engine never
//! receives webhooks; [`verify`] exists for the diagnostics round-trip check.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried in the signature header, e.g. `sha256=ab12...`.
pub const SIGNATURE_SCHEME: &str = "sha256";

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so new_from_slice cannot fail.
    #[allow(clippy::expect_used)]
    HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length")
}

/// Deterministic lowercase hex HMAC-SHA256 digest over the exact payload
/// bytes.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Header value for an outbound request: `sha256=<hex digest>`.
pub fn signature_header(payload: &[u8], secret: &str) -> String {
    format!("{SIGNATURE_SCHEME}={}", sign(payload, secret))
}

/// Recomputes the digest and compares in constant time.
pub fn verify(payload: &[u8], signature_hex: &str, secret: &str) -> bool {
    let expected = sign(payload, secret);
    let provided = signature_hex.as_bytes();
    if provided.len() != expected.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided).into()
}

/// Random endpoint secret, `whsec_`-prefixed so it is recognizable in
/// configuration and logs.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("whsec_{}", hex::encode(bytes))
}
