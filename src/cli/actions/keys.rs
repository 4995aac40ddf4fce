//! Fresh key material for a new deployment.
//!
//! Prints one `PRAGMA_*=value` line per secret the server needs, ready for an env
//! file. Nothing is written to disk.

use anyhow::Result;
use base64ct::{Base64, Encoding};
use ed25519_dalek::SigningKey;
use rand::{CryptoRng, RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt::Write as _, io::Write as _};

/// Generated secrets, base64 encoded the way the server flags expect them.
#[derive(Debug)]
pub struct KeyMaterial {
    pub token_private_key: SecretString,
    pub token_public_key: String,
    pub login_payload_key: SecretString,
    pub verification_secret: SecretString,
}

impl KeyMaterial {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        let signing = SigningKey::from_bytes(&seed);

        let mut login_key = [0u8; 32];
        rng.fill_bytes(&mut login_key);

        let mut verification = [0u8; 48];
        rng.fill_bytes(&mut verification);

        Self {
            token_private_key: SecretString::from(Base64::encode_string(&signing.to_bytes())),
            token_public_key: Base64::encode_string(signing.verifying_key().as_bytes()),
            login_payload_key: SecretString::from(Base64::encode_string(&login_key)),
            verification_secret: SecretString::from(Base64::encode_string(&verification)),
        }
    }

    #[must_use]
    pub fn to_env(&self) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("PRAGMA_TOKEN_PRIVATE_KEY", self.token_private_key.expose_secret()),
            ("PRAGMA_TOKEN_PUBLIC_KEY", self.token_public_key.as_str()),
            ("PRAGMA_LOGIN_PAYLOAD_KEY", self.login_payload_key.expose_secret()),
            ("PRAGMA_VERIFICATION_SECRET", self.verification_secret.expose_secret()),
        ] {
            let _ = writeln!(out, "{name}={value}");
        }
        out
    }
}

/// Execute the keys action.
/// # Errors
/// Returns an error if stdout cannot be written.
pub fn execute() -> Result<()> {
    let material = KeyMaterial::generate(&mut OsRng);
    std::io::stdout()
        .lock()
        .write_all(material.to_env().as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{actions::server::crypto_keys, commands::auth};

    fn options(material: KeyMaterial) -> auth::Options {
        auth::Options {
            token_private_key: material.token_private_key,
            token_public_key: material.token_public_key,
            login_payload_key: material.login_payload_key,
            verification_secret: material.verification_secret,
            frontend_base_url: "https://app.school.test".to_string(),
            mfa_issuer: "Pragma".to_string(),
            breach_api_url: "https://api.pwnedpasswords.com".to_string(),
            breach_api_key: None,
            trusted_proxies: Vec::new(),
        }
    }

    #[test]
    fn generated_material_is_accepted_by_the_server() -> Result<()> {
        let keys = crypto_keys(&options(KeyMaterial::generate(&mut OsRng)))?;
        let sealed = keys.login_cipher.encrypt(b"{\"email\":\"ana@school.test\"}")?;
        assert_eq!(keys.login_cipher.decrypt(&sealed)?, b"{\"email\":\"ana@school.test\"}");
        Ok(())
    }

    #[test]
    fn env_lines_name_every_secret() {
        let env = KeyMaterial::generate(&mut OsRng).to_env();
        let names: Vec<&str> = env
            .lines()
            .filter_map(|line| line.split_once('=').map(|(name, _)| name))
            .collect();
        assert_eq!(
            names,
            [
                "PRAGMA_TOKEN_PRIVATE_KEY",
                "PRAGMA_TOKEN_PUBLIC_KEY",
                "PRAGMA_LOGIN_PAYLOAD_KEY",
                "PRAGMA_VERIFICATION_SECRET",
            ]
        );
    }

    #[test]
    fn each_run_differs() {
        let first = KeyMaterial::generate(&mut OsRng);
        let second = KeyMaterial::generate(&mut OsRng);
        assert_ne!(first.token_public_key, second.token_public_key);
    }
}
