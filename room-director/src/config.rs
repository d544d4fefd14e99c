//! Director configuration.
//!
//! Configuration is an explicit value handed to the director at
//! construction. [`DirectorConfig::from_env`] reads the process environment;
//! [`DirectorConfig::from_lookup`] takes any key lookup so tests never touch
//! global state.

use crate::error::ConfigError;
use std::fmt;
use std::time::Duration;

const DEFAULT_LOCAL_ENDPOINT: &str = "http://127.0.0.1:1234/v1";
const DEFAULT_LOCAL_MODEL: &str = "gpt-oss-120b";
const DEFAULT_REMOTE_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_REMOTE_MODEL: &str = "gpt-5-mini";

/// A secret value whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Configuration for the room director.
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    /// Pending changes that trigger a regeneration on their own.
    pub change_threshold: usize,

    /// Age after which any pending change triggers a regeneration.
    pub max_staleness: Duration,

    /// Minimum gap between ordinary regenerations.
    pub cooldown: Duration,

    pub local_endpoint: String,
    pub local_model: String,

    /// Remote fallback; disabled unless both endpoint and credential are set.
    pub remote_endpoint: Option<String>,
    pub remote_model: String,
    pub remote_credential: Option<Credential>,

    pub timeout_local: Duration,
    pub timeout_remote: Duration,

    /// Extra attempts per variant after a timeout.
    pub retry_attempts: u32,

    /// First backoff delay; doubles on each retry.
    pub retry_base: Duration,

    pub temperature: f32,

    /// Models that reject a non-default temperature.
    pub no_temperature_models: Vec<String>,

    /// Longest description accepted from a model.
    pub max_description_chars: usize,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            change_threshold: 5,
            max_staleness: Duration::from_secs(600),
            cooldown: Duration::from_secs(3),
            local_endpoint: DEFAULT_LOCAL_ENDPOINT.to_string(),
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
            remote_endpoint: None,
            remote_model: DEFAULT_REMOTE_MODEL.to_string(),
            remote_credential: None,
            timeout_local: Duration::from_secs(10),
            timeout_remote: Duration::from_secs(20),
            retry_attempts: 2,
            retry_base: Duration::from_millis(200),
            temperature: 0.4,
            no_temperature_models: vec![DEFAULT_REMOTE_MODEL.to_string()],
            max_description_chars: 4000,
        }
    }
}

impl DirectorConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(v) = get("LOCAL_LLM_BASE_URL") {
            config.local_endpoint = v;
        }
        if let Some(v) = get("LOCAL_LLM_MODEL") {
            config.local_model = v;
        }
        if let Some(v) = get("OPENAI_MODEL") {
            config.remote_model = v;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            config.remote_credential = Some(Credential::new(key));
            config.remote_endpoint =
                Some(get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_REMOTE_ENDPOINT.to_string()));
        }

        if let Some(v) = get("LLM_TIMEOUT_LOCAL_S") {
            config.timeout_local = parse_seconds("LLM_TIMEOUT_LOCAL_S", &v)?;
        }
        if let Some(v) = get("LLM_TIMEOUT_REMOTE_S") {
            config.timeout_remote = parse_seconds("LLM_TIMEOUT_REMOTE_S", &v)?;
        }
        if let Some(v) = get("LLM_TEMPERATURE") {
            config.temperature = parse_number("LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("LLM_NO_TEMPERATURE_MODELS") {
            config.no_temperature_models = v
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("DIRECTOR_CHANGE_THRESHOLD") {
            config.change_threshold = parse_number("DIRECTOR_CHANGE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("DIRECTOR_MAX_STALENESS_S") {
            config.max_staleness = parse_seconds("DIRECTOR_MAX_STALENESS_S", &v)?;
        }
        if let Some(v) = get("DIRECTOR_COOLDOWN_S") {
            config.cooldown = parse_seconds("DIRECTOR_COOLDOWN_S", &v)?;
        }

        Ok(config)
    }

    pub fn with_change_threshold(mut self, threshold: usize) -> Self {
        self.change_threshold = threshold;
        self
    }

    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Self {
        self.max_staleness = max_staleness;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_local(mut self, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        self.local_endpoint = endpoint.into();
        self.local_model = model.into();
        self
    }

    /// Enable the remote fallback.
    pub fn with_remote(
        mut self,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        credential: Credential,
    ) -> Self {
        self.remote_endpoint = Some(endpoint.into());
        self.remote_model = model.into();
        self.remote_credential = Some(credential);
        self
    }

    pub fn with_timeouts(mut self, local: Duration, remote: Duration) -> Self {
        self.timeout_local = local;
        self.timeout_remote = remote;
        self
    }

    pub fn with_retry(mut self, attempts: u32, base: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_base = base;
        self
    }

    /// Endpoint and credential of the remote fallback, if fully configured.
    pub fn remote(&self) -> Option<(&str, &Credential)> {
        match (&self.remote_endpoint, &self.remote_credential) {
            (Some(endpoint), Some(credential)) => Some((endpoint.as_str(), credential)),
            _ => None,
        }
    }
}

fn parse_number<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_number(name, value)?;
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
