use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::error::ConfigError;

/// Lowest spawn rate the scaler cadence supports.
pub const MIN_SPAWN_RATE: f64 = 0.1;

const DEFAULT_WORKERS: usize = 16;
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Run parameters, assembled by the embedder and patched by the CLI or the
/// dashboard start request. Frozen into an `Arc` when a run begins; mid-run
/// changes go through the Runner's reshape operations instead.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub base_url: Url,
    pub users: usize,
    pub spawn_rate: f64,
    pub workers: usize,
    pub open_timeout: Duration,
    pub read_timeout: Duration,
    pub duration: Option<Duration>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8080")
                .unwrap_or_else(|_| unreachable!("default base_url is well-formed")),
            users: 1,
            spawn_rate: 1.0,
            workers: DEFAULT_WORKERS,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            duration: None,
        }
    }
}

impl Configuration {
    /// # Errors
    ///
    /// Returns an error when the URL is not absolute http(s) or cannot be
    /// parsed.
    pub fn with_base_url(url: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.set_base_url(url)?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error when the URL is not absolute http(s) or cannot be
    /// parsed.
    pub fn set_base_url(&mut self, url: &str) -> Result<(), ConfigError> {
        let parsed = Url::parse(url).map_err(|err| ConfigError::InvalidBaseUrl {
            url: url.to_owned(),
            source: err,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ConfigError::BaseUrlNotHttp {
                url: url.to_owned(),
            });
        }
        self.base_url = parsed;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the first constraint the configuration violates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users < 1 {
            return Err(ConfigError::UsersTooSmall);
        }
        if self.spawn_rate < MIN_SPAWN_RATE {
            return Err(ConfigError::SpawnRateTooSmall {
                rate: self.spawn_rate,
                min: MIN_SPAWN_RATE,
            });
        }
        if self.workers < 1 {
            return Err(ConfigError::WorkersTooSmall);
        }
        if self.open_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "open_timeout",
            });
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "read_timeout",
            });
        }
        Ok(())
    }

    /// Status-surface view of the knobs a dashboard client may override.
    #[must_use]
    pub fn public_view(&self) -> ConfigView {
        ConfigView {
            base_url: self.base_url.to_string(),
            users: self.users,
            spawn_rate: self.spawn_rate,
            workers: self.workers,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub base_url: String,
    pub users: usize,
    pub spawn_rate: f64,
    pub workers: usize,
}
