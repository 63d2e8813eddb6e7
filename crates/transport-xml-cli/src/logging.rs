//! Logging setup for the command line tool
//!
//! With the `profiling` feature the `profiling` scopes of the library are
//! emitted as tracing spans and show up in the same output.

use tracing_subscriber::prelude::*;

/// Default filter when RUST_LOG is not set
fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Initialize logging, honouring RUST_LOG when present
pub fn setup_logging_and_profiling() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            std::env::set_var("RUST_LOG", default_filter());
        }
    }

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    #[cfg(feature = "profiling")]
    tracing::info!("Logging initialized (profiling spans enabled)");
    #[cfg(not(feature = "profiling"))]
    tracing::debug!("Logging initialized");
}
