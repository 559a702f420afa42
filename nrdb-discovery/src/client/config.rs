use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DiscoveryError, Result};
use crate::security::SecureString;

/// Environment variable holding the user API key.
pub const ENV_API_KEY: &str = "NEW_RELIC_API_KEY";
/// Environment variable holding the numeric account id.
pub const ENV_ACCOUNT_ID: &str = "NEW_RELIC_ACCOUNT_ID";
/// Environment variable selecting the data center region (`US` or `EU`).
pub const ENV_REGION: &str = "NEW_RELIC_REGION";

/// Data center region of the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    #[default]
    Us,
    Eu,
}

impl Region {
    /// NerdGraph endpoint for the region.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Us => "https://api.newrelic.com/graphql",
            Self::Eu => "https://api.eu.newrelic.com/graphql",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Us => write!(f, "US"),
            Self::Eu => write!(f, "EU"),
        }
    }
}

impl FromStr for Region {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "US" | "" => Ok(Self::Us),
            "EU" => Ok(Self::Eu),
            other => Err(DiscoveryError::configuration(format!(
                "unknown region '{other}', expected US or EU"
            ))),
        }
    }
}

/// Connection settings for the remote store.
///
/// The API key is held as a [`SecureString`]: it is zeroized on drop and
/// redacted from `Debug` output.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    api_key: SecureString,
    account_id: u64,
    region: Region,
    endpoint: Option<String>,
    timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for the given key and account in the US region.
    pub fn new(api_key: impl Into<String>, account_id: u64) -> Self {
        Self {
            api_key: SecureString::new(api_key.into()),
            account_id,
            region: Region::Us,
            endpoint: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Reads `NEW_RELIC_API_KEY`, `NEW_RELIC_ACCOUNT_ID` and `NEW_RELIC_REGION`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| DiscoveryError::configuration(format!("{ENV_API_KEY} is not set")))?;

        let account_id = lookup(ENV_ACCOUNT_ID)
            .ok_or_else(|| DiscoveryError::configuration(format!("{ENV_ACCOUNT_ID} is not set")))?
            .trim()
            .parse::<u64>()
            .map_err(|e| {
                DiscoveryError::configuration(format!("{ENV_ACCOUNT_ID} is not a number: {e}"))
            })?;

        let region = match lookup(ENV_REGION) {
            Some(value) => value.parse()?,
            None => Region::Us,
        };

        let config = Self::new(api_key, account_id).with_region(region);
        config.validate()?;
        Ok(config)
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// Overrides the regional endpoint, e.g. for a proxy or a local stub.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the HTTP timeout for a single query.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the API key.
    ///
    /// # Security
    /// Use `expose()` only when building the request header. Never log it.
    pub fn api_key(&self) -> &SecureString {
        &self.api_key
    }

    pub fn account_id(&self) -> u64 {
        self.account_id
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Endpoint in effect: the override if set, otherwise the regional one.
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.region.endpoint())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(DiscoveryError::configuration("API key must not be empty"));
        }
        if self.account_id == 0 {
            return Err(DiscoveryError::configuration("account id must be non-zero"));
        }
        if self.timeout.is_zero() {
            return Err(DiscoveryError::configuration("timeout must be non-zero"));
        }
        let url = Url::parse(self.endpoint()).map_err(|e| {
            DiscoveryError::configuration(format!("invalid endpoint '{}': {e}", self.endpoint()))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DiscoveryError::configuration(format!(
                "endpoint must use http or https, got '{}'",
                url.scheme()
            )));
        }
        Ok(())
    }
}
