#![forbid(unsafe_code)]

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "REMINDO_LOG";

/// Installs the stderr subscriber. `REMINDO_LOG` overrides `configured`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(configured: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
