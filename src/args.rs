use std::time::Duration;

use clap::Parser;

use crate::config::Configuration;
use crate::dashboard::DEFAULT_DASHBOARD_PORT;
use crate::error::ConfigError;

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Screen-based HTTP load generator - virtual users walk weighted scenario flows against your API and report per-endpoint latency and error stats, live or to a browser dashboard."
)]
pub struct LoadArgs {
    /// Scenario to run
    #[arg(default_value = "main")]
    pub scenario: String,

    /// Base URL the virtual users target
    #[arg(long = "base-url", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Target size of the active user pool
    #[arg(long)]
    pub users: Option<usize>,

    /// Users spawned per second
    #[arg(long = "spawn-rate")]
    pub spawn_rate: Option<f64>,

    /// Advisory concurrency ceiling
    #[arg(long)]
    pub workers: Option<usize>,

    /// Run duration in seconds; unbounded when omitted
    #[arg(long)]
    pub duration: Option<u64>,

    /// Connection-open timeout in seconds
    #[arg(long = "open-timeout")]
    pub open_timeout: Option<u64>,

    /// Read timeout in seconds
    #[arg(long = "read-timeout")]
    pub read_timeout: Option<u64>,

    /// Serve the web dashboard instead of the terminal renderer
    #[arg(long)]
    pub web: bool,

    /// Dashboard port
    #[arg(long, default_value_t = DEFAULT_DASHBOARD_PORT)]
    pub port: u16,

    /// Directory the results JSON is written to
    #[arg(long = "report-dir", default_value = ".")]
    pub report_dir: String,

    /// Disable colored terminal output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl LoadArgs {
    /// Builds the run configuration from the defaults plus every flag the
    /// user supplied.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting (bad URL, zero users, spawn rate
    /// under the floor).
    pub fn to_configuration(&self) -> Result<Configuration, ConfigError> {
        let mut config = Configuration::with_base_url(&self.base_url)?;
        if let Some(users) = self.users {
            config.users = users;
        }
        if let Some(rate) = self.spawn_rate {
            config.spawn_rate = rate;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(secs) = self.duration {
            config.duration = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = self.open_timeout {
            config.open_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.read_timeout {
            config.read_timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }
}
