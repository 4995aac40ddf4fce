//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary executes: starting the API
//! server with its full configuration, or printing fresh key material.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, ARG_REQUEST_TIMEOUT, CMD_KEYS, auth, limits};
use anyhow::{Context, Result};
use std::time::Duration;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if matches.subcommand_name() == Some(CMD_KEYS) {
        return Ok(Action::Keys);
    }

    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let request_timeout = matches
        .get_one::<u64>(ARG_REQUEST_TIMEOUT)
        .copied()
        .map_or(crate::api::DEFAULT_REQUEST_TIMEOUT, Duration::from_secs);

    Ok(Action::Server(Args {
        port,
        dsn,
        request_timeout,
        auth: auth::Options::parse(matches)?,
        limits: limits::parse(matches),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{Quota, RateLimitAction};
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_action() -> Result<()> {
        temp_env::with_vars(
            [
                ("PRAGMA_TOKEN_PRIVATE_KEY", Some("private")),
                ("PRAGMA_TOKEN_PUBLIC_KEY", Some("public")),
                ("PRAGMA_LOGIN_PAYLOAD_KEY", Some("login")),
                ("PRAGMA_VERIFICATION_SECRET", Some("verification")),
                ("PRAGMA_RATE_LIMIT_LOGIN", Some("3/60")),
                ("PRAGMA_REQUEST_TIMEOUT_SECONDS", None),
            ],
            || {
                let matches = crate::cli::commands::new().try_get_matches_from(vec![
                    "pragma",
                    "--dsn",
                    "postgres://pragma@localhost:5432/pragma",
                    "--port",
                    "8443",
                ])?;
                let Action::Server(args) = handler(&matches)? else {
                    anyhow::bail!("expected a server action");
                };
                assert_eq!(args.port, 8443);
                assert_eq!(args.dsn, "postgres://pragma@localhost:5432/pragma");
                assert_eq!(args.request_timeout, Duration::from_secs(30));
                assert_eq!(args.auth.verification_secret.expose_secret(), "verification");
                assert_eq!(
                    args.limits.quota(RateLimitAction::Login),
                    Quota::per_period(3, 60.0)
                );
                Ok(())
            },
        )
    }

    #[test]
    fn keys_subcommand_dispatches_without_server_config() -> Result<()> {
        temp_env::with_vars(
            [
                ("PRAGMA_DSN", None::<&str>),
                ("PRAGMA_TOKEN_PRIVATE_KEY", None),
            ],
            || {
                let matches =
                    crate::cli::commands::new().try_get_matches_from(vec!["pragma", "keys"])?;
                assert!(matches!(handler(&matches)?, Action::Keys));
                Ok(())
            },
        )
    }
}
