use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber for the process. `RUST_LOG` takes precedence over
/// `filter`. Does nothing if a global subscriber is already set.
pub fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();
}
