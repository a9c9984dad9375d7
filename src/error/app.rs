use thiserror::Error;

use super::{ConfigError, DashboardError, ScenarioBuildError, ValidationError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("HTTP client error: {source}")]
    Reqwest {
        #[from]
        source: reqwest::Error,
    },
    #[error("Join error: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioBuildError),
    #[error("Dashboard error: {0}")]
    Dashboard(#[from] DashboardError),
}

pub type AppResult<T> = Result<T, AppError>;
