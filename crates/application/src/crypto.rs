//! Crypto primitives
//!
//! Secure randomness, hashing, HMAC and encodings used by the placeholder
//! engine and the authentication strategies.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Alphanumeric character set.
pub const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// RFC 7636 unreserved characters, valid in a PKCE code verifier.
pub const PKCE_UNRESERVED: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Crypto errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The MAC key was rejected.
    #[error("invalid HMAC key")]
    InvalidKey,

    /// `random_string` was given an empty character set.
    #[error("character set must not be empty")]
    EmptyCharset,
}

/// Returns `n` bytes from the thread-local CSPRNG.
#[must_use]
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0_u8; n];
    rand::rng().fill(bytes.as_mut_slice());
    bytes
}

/// Returns a string of `len` characters drawn uniformly from `charset`.
///
/// # Errors
///
/// Returns [`CryptoError::EmptyCharset`] when `charset` is empty.
pub fn random_string(len: usize, charset: &[u8]) -> Result<String, CryptoError> {
    if charset.is_empty() {
        return Err(CryptoError::EmptyCharset);
    }
    let mut rng = rand::rng();
    Ok((0..len)
        .map(|_| char::from(charset[rng.random_range(0..charset.len())]))
        .collect())
}

/// Returns a random alphanumeric string of `len` characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())]))
        .collect()
}

/// SHA-256 digest.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0_u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Lower-case hex SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    sha256(data).iter().map(|b| format!("{b:02x}")).collect()
}

/// HMAC-SHA256 of `data` under `key`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if the MAC rejects the key.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    mac.update(data);
    let mut out = [0_u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// URL-safe base64 without padding.
#[must_use]
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Standard base64 with padding.
#[must_use]
pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Compares two byte strings without leaking where they differ.
///
/// Inputs of different length compare unequal.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
