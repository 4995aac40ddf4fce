//! AES-256-GCM decryption of client-encrypted login bodies.
//!
//! Wire format: `base64(nonce (12 bytes) || ciphertext || tag (16 bytes))`, standard
//! alphabet with padding. The key is provisioned to the frontend out of band.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64ct::{Base64, Encoding};
use rand::{RngCore, rngs::OsRng};
use std::fmt;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("invalid base64 encoding")]
    Base64,
    #[error("key must be exactly {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),
    #[error("payload too short")]
    Truncated,
    #[error("authentication failed")]
    Authentication,
    #[error("failed to read OS randomness")]
    Random,
}

#[derive(Clone)]
pub struct LoginPayloadCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for LoginPayloadCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginPayloadCipher").finish_non_exhaustive()
    }
}

impl LoginPayloadCipher {
    /// Build the cipher from a base64-encoded 32-byte key.
    ///
    /// # Errors
    /// Returns an error if the key is not valid base64 or not 32 bytes long.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, CipherError> {
        let key = Base64::decode_vec(key_b64.trim()).map_err(|_| CipherError::Base64)?;
        Self::from_key(&key)
    }

    /// # Errors
    /// Returns an error if the key is not 32 bytes long.
    pub fn from_key(key: &[u8]) -> Result<Self, CipherError> {
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::KeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    /// Decrypt a payload. Any malformed or tampered input fails closed.
    ///
    /// # Errors
    /// Returns an error on bad base64, truncated input or tag mismatch.
    pub fn decrypt(&self, payload_b64: &str) -> Result<Vec<u8>, CipherError> {
        let data = Base64::decode_vec(payload_b64.trim()).map_err(|_| CipherError::Base64)?;
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Authentication)
    }

    /// Produce a payload the way the frontend does.
    ///
    /// # Errors
    /// Returns an error if randomness is unavailable or encryption fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| CipherError::Random)?;
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::Authentication)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(Base64::encode_string(&out))
    }
}
