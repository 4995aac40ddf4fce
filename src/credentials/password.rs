use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;

/// Memory cost in KiB (64 MiB).
pub const MEMORY_KIB: u32 = 64 * 1024;
pub const ITERATIONS: u32 = 3;
pub const PARALLELISM: u32 = 4;
pub const OUTPUT_LEN: usize = 32;
pub const MIN_PASSWORD_CHARS: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("invalid argon2 parameters: {0}")]
    Params(#[from] argon2::Error),
    #[error("password hashing failed: {0}")]
    Hash(#[from] password_hash::Error),
}

/// Returned when a candidate password does not meet the minimum policy.
/// The message is safe to show to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct WeakPassword(pub String);

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, PARALLELISM, Some(OUTPUT_LEN))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password with Argon2id and a fresh 16-byte salt.
///
/// The result is a PHC string (`$argon2id$v=19$m=65536,t=3,p=4$...`) so the
/// parameters travel with the hash.
///
/// # Errors
/// Returns an error if the parameters are rejected or hashing fails.
pub fn hash_password(plaintext: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?.hash_password(plaintext.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string.
///
/// Parameters are taken from the stored hash, not from the current defaults, so
/// hashes created under older settings keep verifying.
///
/// # Errors
/// Returns an error if the stored hash cannot be parsed.
pub fn verify_password(plaintext: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored)?;
    match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Enforce the minimum password policy.
///
/// # Errors
/// Returns [`WeakPassword`] when the password is shorter than 12 characters.
pub fn validate_strength(plaintext: &str) -> Result<(), WeakPassword> {
    if plaintext.chars().count() < MIN_PASSWORD_CHARS {
        return Err(WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}
