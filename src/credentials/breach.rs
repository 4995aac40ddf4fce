//! Breached-password lookups against a k-anonymity range API.
//!
//! Only the first five hex characters of the password's SHA-1 leave the process.
//! The API answers with every known suffix for that prefix (`SUFFIX:COUNT` per line)
//! and the match happens locally.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use sha1::{Digest, Sha1};
use std::time::Duration;
use tracing::{Instrument, info_span, warn};
use url::Url;

pub const DEFAULT_BREACH_API_URL: &str = "https://api.pwnedpasswords.com";
pub const DEFAULT_BREACH_TIMEOUT: Duration = Duration::from_secs(5);

const PREFIX_LEN: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum BreachLookupError {
    #[error("breach lookup request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("breach lookup returned status {0}")]
    Status(StatusCode),
}

/// What to do when the lookup itself fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreachPolicy {
    /// Treat the password as not breached and surface the error to the caller.
    FailOpen,
}

impl BreachPolicy {
    fn on_lookup_error(self, err: BreachLookupError) -> BreachCheck {
        match self {
            Self::FailOpen => {
                warn!(error = %err, "breach lookup unavailable; allowing password");
                BreachCheck {
                    breached: false,
                    error: Some(err),
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct BreachCheck {
    pub breached: bool,
    pub error: Option<BreachLookupError>,
}

#[derive(Clone, Debug)]
pub struct BreachChecker {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    policy: BreachPolicy,
}

impl BreachChecker {
    /// Build a checker for the range API at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed =
            Url::parse(base_url).with_context(|| format!("Invalid breach API URL: {base_url}"))?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build breach API HTTP client")?;
        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            api_key: None,
            policy: BreachPolicy::FailOpen,
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    #[must_use]
    pub fn policy(&self) -> BreachPolicy {
        self.policy
    }

    /// Look the password up; lookup failures resolve through the configured policy.
    pub async fn check(&self, plaintext: &str) -> BreachCheck {
        let (prefix, suffix) = sha1_prefix_suffix(plaintext);
        match self.fetch_range(&prefix).await {
            Ok(body) => BreachCheck {
                breached: range_contains(&body, &suffix),
                error: None,
            },
            Err(err) => self.policy.on_lookup_error(err),
        }
    }

    async fn fetch_range(&self, prefix: &str) -> Result<String, BreachLookupError> {
        let url = format!("{}/range/{prefix}", self.base_url);
        let span = info_span!("http.client", http.method = "GET", http.url = %url);
        async {
            let mut request = self.client.get(&url);
            if let Some(api_key) = &self.api_key {
                request = request.header("hibp-api-key", api_key);
            }
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(BreachLookupError::Status(status));
            }
            Ok(response.text().await?)
        }
        .instrument(span)
        .await
    }
}

fn sha1_prefix_suffix(plaintext: &str) -> (String, String) {
    let digest = format!("{:X}", Sha1::digest(plaintext.as_bytes()));
    let (prefix, suffix) = digest.split_at(PREFIX_LEN);
    (prefix.to_string(), suffix.to_string())
}

fn range_contains(body: &str, suffix: &str) -> bool {
    body.lines().any(|line| {
        line.trim()
            .split_once(':')
            .is_some_and(|(candidate, _count)| candidate.eq_ignore_ascii_case(suffix))
    })
}
