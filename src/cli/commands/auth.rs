use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::net::IpAddr;

use crate::credentials::breach::DEFAULT_BREACH_API_URL;

pub const ARG_TOKEN_PRIVATE_KEY: &str = "token-private-key";
pub const ARG_TOKEN_PUBLIC_KEY: &str = "token-public-key";
pub const ARG_LOGIN_PAYLOAD_KEY: &str = "login-payload-key";
pub const ARG_VERIFICATION_SECRET: &str = "verification-secret";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_MFA_ISSUER: &str = "mfa-issuer";
pub const ARG_BREACH_API_URL: &str = "breach-api-url";
pub const ARG_BREACH_API_KEY: &str = "breach-api-key";
pub const ARG_TRUSTED_PROXIES: &str = "trusted-proxies";

/// Key material and auth settings, kept secret until parsed into key types.
#[derive(Debug)]
pub struct Options {
    pub token_private_key: SecretString,
    pub token_public_key: String,
    pub login_payload_key: SecretString,
    pub verification_secret: SecretString,
    pub frontend_base_url: String,
    pub mfa_issuer: String,
    pub breach_api_url: String,
    pub breach_api_key: Option<SecretString>,
    pub trusted_proxies: Vec<IpAddr>,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let required = |name: &str| -> Result<String> {
            matches
                .get_one::<String>(name)
                .cloned()
                .with_context(|| format!("missing required argument: --{name}"))
        };

        Ok(Self {
            token_private_key: SecretString::from(required(ARG_TOKEN_PRIVATE_KEY)?),
            token_public_key: required(ARG_TOKEN_PUBLIC_KEY)?,
            login_payload_key: SecretString::from(required(ARG_LOGIN_PAYLOAD_KEY)?),
            verification_secret: SecretString::from(required(ARG_VERIFICATION_SECRET)?),
            frontend_base_url: required(ARG_FRONTEND_BASE_URL)?,
            mfa_issuer: required(ARG_MFA_ISSUER)?,
            breach_api_url: required(ARG_BREACH_API_URL)?,
            breach_api_key: matches
                .get_one::<String>(ARG_BREACH_API_KEY)
                .cloned()
                .map(SecretString::from),
            trusted_proxies: matches
                .get_many::<IpAddr>(ARG_TRUSTED_PROXIES)
                .map(|proxies| proxies.copied().collect())
                .unwrap_or_default(),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_key_args(command);
    with_policy_args(command)
}

fn with_key_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_PRIVATE_KEY)
                .long(ARG_TOKEN_PRIVATE_KEY)
                .help("Ed25519 private key (base64, 32 bytes) used to sign session tokens")
                .env("PRAGMA_TOKEN_PRIVATE_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_PUBLIC_KEY)
                .long(ARG_TOKEN_PUBLIC_KEY)
                .help("Ed25519 public key (base64, 32 bytes) matching the private key")
                .env("PRAGMA_TOKEN_PUBLIC_KEY")
                .required(true),
        )
        .arg(
            Arg::new(ARG_LOGIN_PAYLOAD_KEY)
                .long(ARG_LOGIN_PAYLOAD_KEY)
                .help("AES-256-GCM key (base64, 32 bytes) for encrypted login payloads")
                .env("PRAGMA_LOGIN_PAYLOAD_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_VERIFICATION_SECRET)
                .long(ARG_VERIFICATION_SECRET)
                .help("Root secret for document verification codes")
                .env("PRAGMA_VERIFICATION_SECRET")
                .hide_env_values(true)
                .required(true),
        )
}

fn with_policy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, the only origin allowed by CORS")
                .env("PRAGMA_FRONTEND_BASE_URL")
                .default_value("https://app.pragmagrading.com"),
        )
        .arg(
            Arg::new(ARG_MFA_ISSUER)
                .long(ARG_MFA_ISSUER)
                .help("Issuer shown in authenticator apps")
                .env("PRAGMA_MFA_ISSUER")
                .default_value("Pragma"),
        )
        .arg(
            Arg::new(ARG_BREACH_API_URL)
                .long(ARG_BREACH_API_URL)
                .help("Base URL of the k-anonymity breached password range API")
                .env("PRAGMA_BREACH_API_URL")
                .default_value(DEFAULT_BREACH_API_URL),
        )
        .arg(
            Arg::new(ARG_BREACH_API_KEY)
                .long(ARG_BREACH_API_KEY)
                .help("Optional API key sent to the breach API")
                .env("PRAGMA_BREACH_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_TRUSTED_PROXIES)
                .long(ARG_TRUSTED_PROXIES)
                .help("Comma-separated proxy IPs whose X-Forwarded-For is believed; others are keyed by peer address")
                .env("PRAGMA_TRUSTED_PROXIES")
                .value_delimiter(',')
                .value_parser(clap::value_parser!(IpAddr)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn command() -> Command {
        with_args(Command::new("pragma"))
    }

    #[test]
    fn parses_keys_and_defaults() -> Result<()> {
        temp_env::with_vars(
            [
                ("PRAGMA_BREACH_API_KEY", None::<&str>),
                ("PRAGMA_FRONTEND_BASE_URL", None::<&str>),
                ("PRAGMA_TRUSTED_PROXIES", None::<&str>),
            ],
            || {
                let matches = command().try_get_matches_from([
                    "pragma",
                    "--token-private-key",
                    "cHJpdmF0ZQ==",
                    "--token-public-key",
                    "cHVibGlj",
                    "--login-payload-key",
                    "bG9naW4=",
                    "--verification-secret",
                    "root-secret",
                ])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.token_private_key.expose_secret(), "cHJpdmF0ZQ==");
                assert_eq!(options.token_public_key, "cHVibGlj");
                assert_eq!(options.verification_secret.expose_secret(), "root-secret");
                assert_eq!(options.frontend_base_url, "https://app.pragmagrading.com");
                assert_eq!(options.mfa_issuer, "Pragma");
                assert_eq!(options.breach_api_url, DEFAULT_BREACH_API_URL);
                assert!(options.breach_api_key.is_none());
                assert!(options.trusted_proxies.is_empty());
                Ok(())
            },
        )
    }

    #[test]
    fn secrets_come_from_env() -> Result<()> {
        temp_env::with_vars(
            [
                ("PRAGMA_TOKEN_PRIVATE_KEY", Some("env-private")),
                ("PRAGMA_TOKEN_PUBLIC_KEY", Some("env-public")),
                ("PRAGMA_LOGIN_PAYLOAD_KEY", Some("env-login")),
                ("PRAGMA_VERIFICATION_SECRET", Some("env-verification")),
                ("PRAGMA_BREACH_API_KEY", Some("env-breach")),
            ],
            || {
                let matches = command().try_get_matches_from(["pragma"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.login_payload_key.expose_secret(), "env-login");
                assert_eq!(
                    options
                        .breach_api_key
                        .as_ref()
                        .map(|key| key.expose_secret().to_string()),
                    Some("env-breach".to_string())
                );
                Ok(())
            },
        )
    }

    #[test]
    fn trusted_proxies_from_env_list() -> Result<()> {
        temp_env::with_vars(
            [
                ("PRAGMA_TOKEN_PRIVATE_KEY", Some("private")),
                ("PRAGMA_TOKEN_PUBLIC_KEY", Some("public")),
                ("PRAGMA_LOGIN_PAYLOAD_KEY", Some("login")),
                ("PRAGMA_VERIFICATION_SECRET", Some("verification")),
                ("PRAGMA_TRUSTED_PROXIES", Some("10.0.0.1,fd00::1")),
            ],
            || {
                let matches = command().try_get_matches_from(["pragma"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(
                    options.trusted_proxies,
                    vec![
                        IpAddr::from([10, 0, 0, 1]),
                        "fd00::1".parse::<IpAddr>()?
                    ]
                );
                Ok(())
            },
        )
    }

    #[test]
    fn malformed_proxy_is_rejected() {
        let result = command().try_get_matches_from([
            "pragma",
            "--token-private-key",
            "p",
            "--token-public-key",
            "p",
            "--login-payload-key",
            "l",
            "--verification-secret",
            "v",
            "--trusted-proxies",
            "10.0.0.1,proxy.internal",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn secrets_are_not_printed() -> Result<()> {
        temp_env::with_vars(
            [
                ("PRAGMA_TOKEN_PRIVATE_KEY", Some("very-secret-private")),
                ("PRAGMA_TOKEN_PUBLIC_KEY", Some("public")),
                ("PRAGMA_LOGIN_PAYLOAD_KEY", Some("very-secret-login")),
                ("PRAGMA_VERIFICATION_SECRET", Some("very-secret-root")),
            ],
            || {
                let matches = command().try_get_matches_from(["pragma"])?;
                let options = Options::parse(&matches)?;
                let debug = format!("{options:?}");
                assert!(!debug.contains("very-secret"));
                Ok(())
            },
        )
    }

    #[test]
    fn missing_keys_fail() {
        temp_env::with_vars(
            [
                ("PRAGMA_TOKEN_PRIVATE_KEY", None::<&str>),
                ("PRAGMA_TOKEN_PUBLIC_KEY", None::<&str>),
                ("PRAGMA_LOGIN_PAYLOAD_KEY", None::<&str>),
                ("PRAGMA_VERIFICATION_SECRET", None::<&str>),
            ],
            || {
                let result = command().try_get_matches_from(["pragma"]);
                assert_eq!(
                    result.map_err(|e| e.kind()).err(),
                    Some(clap::error::ErrorKind::MissingRequiredArgument)
                );
            },
        );
    }
}
