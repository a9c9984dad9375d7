use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid base_url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("base_url '{url}' must be an absolute http(s) URL with a host.")]
    BaseUrlNotHttp { url: String },
    #[error("users must be >= 1.")]
    UsersTooSmall,
    #[error("spawn_rate must be >= {min} users/s (got {rate}).")]
    SpawnRateTooSmall { rate: f64, min: f64 },
    #[error("workers must be >= 1.")]
    WorkersTooSmall,
    #[error("{name} must be > 0 seconds.")]
    ZeroTimeout { name: &'static str },
}
