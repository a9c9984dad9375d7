use tracing_subscriber::{EnvFilter, fmt};

/// Environment variables consulted for the log filter, highest precedence
/// first. An unparsable value falls through to the next source.
const FILTER_VARS: [&str; 2] = ["LOADSMITH_LOG", "RUST_LOG"];

pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = FILTER_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback));

    let subscriber = fmt().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // A subscriber is already installed (second init, or a test
        // harness); that one keeps receiving events.
        tracing::debug!("logging already initialized; keeping the existing subscriber");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_keeps_the_first_subscriber() {
        init_logging(true);
        init_logging(false);
    }

    #[test]
    fn filter_vars_prefer_the_crate_specific_name() {
        assert_eq!(FILTER_VARS[0], "LOADSMITH_LOG");
    }
}
