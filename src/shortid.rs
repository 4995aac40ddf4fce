//! Short public identifiers (8 base62 characters).
//!
//! Ids are drawn from the OS CSPRNG with rejection sampling so every character is
//! uniform over the alphabet. Uniqueness is the caller's problem: tables carry a
//! UNIQUE constraint and inserts retry on conflict.

use rand::{RngCore, rngs::OsRng};

pub const LENGTH: usize = 8;

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

// 62 * 4; bytes at or above this would bias the modulo.
const REJECT_FROM: u8 = 248;

#[derive(Debug, thiserror::Error)]
#[error("failed to read OS randomness: {0}")]
pub struct IdentifierError(#[from] rand::Error);

/// Generate a fresh identifier from OS randomness.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn generate() -> Result<String, IdentifierError> {
    generate_with(&mut OsRng)
}

pub(crate) fn generate_with<R: RngCore>(rng: &mut R) -> Result<String, IdentifierError> {
    let mut id = String::with_capacity(LENGTH);
    let mut byte = [0u8; 1];
    while id.len() < LENGTH {
        rng.try_fill_bytes(&mut byte)?;
        if byte[0] >= REJECT_FROM {
            continue;
        }
        id.push(char::from(ALPHABET[usize::from(byte[0] % 62)]));
    }
    Ok(id)
}

/// True when `s` is exactly 8 characters from `[0-9A-Za-z]`.
#[must_use]
pub fn validate(s: &str) -> bool {
    s.len() == LENGTH && s.bytes().all(|b| b.is_ascii_alphanumeric())
}
