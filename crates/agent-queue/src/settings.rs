//! Queue endpoint identity and settings for the provider and refresher.
//!
//! Settings are plain serde structs with defaults. `QueueSettings::load`
//! layers an optional file under `AGENT_QUEUE__*` environment variables
//! (double-underscore separator), e.g. `AGENT_QUEUE__QUEUE_URL` or
//! `AGENT_QUEUE__REFRESH__ERROR_PERIOD_SECONDS`.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "AGENT_QUEUE";

/// Longest long-poll wait the queue service accepts
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;

/// Immutable address of the queue a provider targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEndpoint {
    queue_url: String,
    region: String,
}

impl QueueEndpoint {
    /// Create a validated queue endpoint
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when the queue URL is empty or not an
    /// http(s) URL, or when the region is empty.
    pub fn new(
        queue_url: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let queue_url = queue_url.into();
        let region = region.into();

        if queue_url.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "queue_url".to_string(),
            });
        }

        let parsed = Url::parse(&queue_url).map_err(|e| ConfigurationError::Invalid {
            key: "queue_url".to_string(),
            message: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigurationError::Invalid {
                key: "queue_url".to_string(),
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if region.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "region".to_string(),
            });
        }

        Ok(Self { queue_url, region })
    }

    /// Queue URL
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Region the queue lives in
    pub fn region(&self) -> &str {
        &self.region
    }
}

/// Settings for a queue provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Queue URL to poll
    pub queue_url: String,

    /// Region used for request signing
    pub region: String,

    /// Override for the queue service endpoint (LocalStack, VPC endpoints)
    pub endpoint_url: Option<String>,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_seconds: u64,

    /// Long-poll wait for receive calls; 0 returns immediately
    pub wait_time_seconds: u32,

    /// Verify new credentials with a cheap queue call before installing them
    pub verify_credentials: bool,

    /// Credential refresh schedule
    pub refresh: RefreshSettings,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            region: String::new(),
            endpoint_url: None,
            request_timeout_seconds: 30,
            wait_time_seconds: 0,
            verify_credentials: false,
            refresh: RefreshSettings::default(),
        }
    }
}

impl QueueSettings {
    /// Load settings from an optional file and the environment
    ///
    /// The file format is taken from its extension (yaml, toml, json).
    /// Environment variables override file values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Load {
                message: e.to_string(),
            })?;

        let settings: QueueSettings =
            config
                .try_deserialize()
                .map_err(|e| ConfigurationError::Load {
                    message: e.to_string(),
                })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings, failing fast before any queue operation
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.endpoint()?;

        if let Some(endpoint_url) = &self.endpoint_url {
            Url::parse(endpoint_url).map_err(|e| ConfigurationError::Invalid {
                key: "endpoint_url".to_string(),
                message: e.to_string(),
            })?;
        }

        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                key: "request_timeout_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ConfigurationError::Invalid {
                key: "wait_time_seconds".to_string(),
                message: format!("must be at most {}", MAX_WAIT_TIME_SECONDS),
            });
        }

        self.refresh.validate()
    }

    /// Queue endpoint described by these settings
    pub fn endpoint(&self) -> Result<QueueEndpoint, ConfigurationError> {
        QueueEndpoint::new(self.queue_url.clone(), self.region.clone())
    }

    /// Per-request HTTP timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Schedule for the credential refresher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Wait after a successful refresh
    pub success_period_seconds: u64,

    /// Wait after a failed refresh before trying again
    pub error_period_seconds: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            success_period_seconds: 900,
            error_period_seconds: 30,
        }
    }
}

impl RefreshSettings {
    /// Validate refresh periods
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.success_period_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                key: "refresh.success_period_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.error_period_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                key: "refresh.error_period_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Wait after a successful refresh
    pub fn success_period(&self) -> Duration {
        Duration::from_secs(self.success_period_seconds)
    }

    /// Wait after a failed refresh
    pub fn error_period(&self) -> Duration {
        Duration::from_secs(self.error_period_seconds)
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
