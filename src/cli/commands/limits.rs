use clap::{Arg, ArgMatches, Command, builder::ValueParser};

use crate::rate_limit::{LimitsConfig, Quota, RateLimitAction};

/// `--rate-limit-<family>` for every limiter family, e.g. `--rate-limit-login`.
fn arg_name(action: RateLimitAction) -> String {
    format!("rate-limit-{}", action.as_str().replace('_', "-"))
}

fn env_name(action: RateLimitAction) -> String {
    format!("PRAGMA_RATE_LIMIT_{}", action.as_str().to_uppercase())
}

/// Parse `LIMIT/SECONDS`, e.g. `10/3600` for ten requests per hour.
#[must_use]
pub fn validator_quota() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<Quota, String> {
        let (limit, period) = value
            .split_once('/')
            .ok_or_else(|| format!("expected LIMIT/SECONDS, got {value}"))?;
        let limit = limit
            .trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid limit {limit}: {err}"))?;
        let period = period
            .trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid period {period}: {err}"))?;
        if limit == 0 || period == 0 {
            return Err("limit and period must be greater than zero".to_string());
        }
        Ok(Quota::per_period(limit, f64::from(period)))
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    RateLimitAction::ALL
        .into_iter()
        .fold(command, |command, action| {
            command.arg(
                Arg::new(arg_name(action))
                    .long(arg_name(action))
                    .help(format!(
                        "Override the {action} limiter as LIMIT/SECONDS (default: built-in quota)"
                    ))
                    .env(env_name(action))
                    .value_parser(validator_quota()),
            )
        })
}

/// Collect overrides; families without a value keep their default quota.
#[must_use]
pub fn parse(matches: &ArgMatches) -> LimitsConfig {
    RateLimitAction::ALL
        .into_iter()
        .fold(LimitsConfig::default(), |config, action| {
            match matches.get_one::<Quota>(&arg_name(action)) {
                Some(quota) => config.with_quota(action, *quota),
                None => config,
            }
        })
}
