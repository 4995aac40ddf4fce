use crate::{
    api::{
        self, ServerConfig,
        context::TrustedProxies,
        state::{AuthConfig, CryptoKeys},
    },
    cli::commands::auth,
    credentials::{BreachChecker, breach::DEFAULT_BREACH_TIMEOUT},
    crypto::{LoginPayloadCipher, VerificationCodeMinter},
    rate_limit::LimitsConfig,
    session_token::TokenAuthority,
};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub request_timeout: Duration,
    pub auth: auth::Options,
    pub limits: LimitsConfig,
}

/// Parse key material into key types. Secrets are only exposed for the parse call.
pub(crate) fn crypto_keys(options: &auth::Options) -> Result<CryptoKeys> {
    let tokens = TokenAuthority::from_base64_keys(
        options.token_private_key.expose_secret(),
        &options.token_public_key,
    )
    .context("Invalid session token key pair")?;
    let login_cipher = LoginPayloadCipher::from_base64_key(options.login_payload_key.expose_secret())
        .context("Invalid login payload key")?;
    let verification =
        VerificationCodeMinter::new(options.verification_secret.expose_secret().as_bytes())
            .context("Invalid verification secret")?;
    Ok(CryptoKeys {
        tokens,
        login_cipher,
        verification,
    })
}

fn log_startup_args(args: &Args) {
    debug!(
        port = args.port,
        request_timeout_seconds = args.request_timeout.as_secs(),
        frontend_base_url = %args.auth.frontend_base_url,
        breach_api_url = %args.auth.breach_api_url,
        mfa_issuer = %args.auth.mfa_issuer,
        trusted_proxies = ?args.auth.trusted_proxies,
        "server arguments"
    );
}

/// Execute the server action.
/// # Errors
/// Returns an error if key material is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let keys = crypto_keys(&args.auth)?;

    let breach = BreachChecker::new(&args.auth.breach_api_url, DEFAULT_BREACH_TIMEOUT)
        .context("Failed to build breach check client")?
        .with_api_key(
            args.auth
                .breach_api_key
                .as_ref()
                .map(|key| key.expose_secret().to_string()),
        );

    let auth_config = AuthConfig::new(args.auth.frontend_base_url)
        .with_mfa_issuer(args.auth.mfa_issuer)
        .with_trusted_proxies(TrustedProxies::new(args.auth.trusted_proxies));

    info!("Starting pragma on port {}", args.port);

    api::new(
        args.port,
        args.dsn,
        ServerConfig {
            auth: auth_config,
            keys,
            limits: args.limits,
            breach,
            request_timeout: args.request_timeout,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::{Base64, Encoding};
    use ed25519_dalek::SigningKey;
    use secrecy::SecretString;

    fn options(private: &str, public: &str) -> auth::Options {
        auth::Options {
            token_private_key: SecretString::from(private.to_string()),
            token_public_key: public.to_string(),
            login_payload_key: SecretString::from(Base64::encode_string(&[9u8; 32])),
            verification_secret: SecretString::from("a".repeat(32)),
            frontend_base_url: "https://app.school.test".to_string(),
            mfa_issuer: "Pragma".to_string(),
            breach_api_url: "https://api.pwnedpasswords.com".to_string(),
            breach_api_key: None,
            trusted_proxies: Vec::new(),
        }
    }

    #[test]
    fn parses_valid_key_material() -> Result<()> {
        let signing = SigningKey::from_bytes(&[5u8; 32]);
        let private = Base64::encode_string(&signing.to_bytes());
        let public = Base64::encode_string(signing.verifying_key().as_bytes());
        let keys = crypto_keys(&options(&private, &public))?;
        let issued = keys.tokens.issue(
            uuid::Uuid::new_v4(),
            None,
            crate::roles::Role::SuperAdmin,
            "ops@pragmagrading.com",
            true,
        )?;
        assert!(keys.tokens.validate(&issued.token).is_ok());
        Ok(())
    }

    #[test]
    fn mismatched_key_pair_is_rejected() {
        let signing = SigningKey::from_bytes(&[5u8; 32]);
        let other = SigningKey::from_bytes(&[6u8; 32]);
        let private = Base64::encode_string(&signing.to_bytes());
        let public = Base64::encode_string(other.verifying_key().as_bytes());
        let result = crypto_keys(&options(&private, &public));
        assert!(result.is_err());
    }
}
