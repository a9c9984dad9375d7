mod app;
mod config;
mod dashboard;
mod scenario;
mod validation;

pub use app::{AppError, AppResult};
pub use config::ConfigError;
pub use dashboard::DashboardError;
pub use scenario::ScenarioBuildError;
pub use validation::ValidationError;
