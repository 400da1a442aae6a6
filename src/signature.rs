//! Authenticity checks for inbound callbacks and request signing for the
//! settlement rail.
//!
//! Webhook verification always runs over the exact bytes received. Nothing is
//! parsed or re-serialized before the MAC check passes.

use {
    hmac::{Hmac, Mac},
    sha2::{Digest, Sha256, Sha512},
};

type HmacSha256 = Hmac<Sha256>;

/// Number of empty placeholder fields in the settlement rail's canonical string.
pub const EMPTY_PLACEHOLDERS: usize = 10;

/// Hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex HMAC-SHA256 signature over the raw body.
pub fn verify(raw_body: &[u8], claimed_signature: &str, secret: &str) -> bool {
    let Ok(claimed) = hex::decode(claimed_signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&claimed).is_ok()
}

/// Checkout confirmation signature: HMAC over `"<gateway order>|<payment>"`.
pub fn verify_checkout(
    gateway_order_ref: &str,
    payment_ref: &str,
    claimed_signature: &str,
    key_secret: &str,
) -> bool {
    let payload = format!("{gateway_order_ref}|{payment_ref}");
    verify(payload.as_bytes(), claimed_signature, key_secret)
}

fn canonical(head: &[&str], tail: &[&str]) -> String {
    let mut parts: Vec<&str> = head.to_vec();
    parts.extend(std::iter::repeat_n("", EMPTY_PLACEHOLDERS));
    parts.extend_from_slice(tail);
    parts.join("|")
}

/// `f1|f2|...|fn|` + ten empty fields + `|salt`.
pub fn request_canonical(fields: &[&str], salt: &str) -> String {
    canonical(fields, &[salt])
}

/// `salt|status|` + ten empty fields + `|fn|...|f1` (request fields reversed).
pub fn response_canonical(status: &str, fields: &[&str], salt: &str) -> String {
    let reversed: Vec<&str> = fields.iter().rev().copied().collect();
    canonical(&[salt, status], &reversed)
}

pub fn request_hash(fields: &[&str], salt: &str) -> String {
    hex::encode(Sha512::digest(request_canonical(fields, salt).as_bytes()))
}

pub fn response_hash(status: &str, fields: &[&str], salt: &str) -> String {
    hex::encode(Sha512::digest(response_canonical(status, fields, salt).as_bytes()))
}

/// Verify a response hash against the reverse canonical string.
pub fn verify_response(status: &str, fields: &[&str], salt: &str, claimed_hash: &str) -> bool {
    let expected = response_hash(status, fields, salt);
    constant_time_eq(
        expected.as_bytes(),
        claimed_hash.trim().to_ascii_lowercase().as_bytes(),
    )
}

/// Constant-time comparison of a presented bearer token with the configured one.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    constant_time_eq(presented.as_bytes(), expected.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
