//! Console logging initialization.
//!
//! Structured console logging for processes embedding an assembled server.
//! Logs go to stdout, which suits containerized deployments; pointing them
//! anywhere else is the host application's concern.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging once per process.
///
/// The filter comes from `GANTRY_LOG`, then `RUST_LOG`, then an
/// environment-based default (`info` in production, `debug` otherwise, with
/// the environment read from `GANTRY_ENV` or `APP_ENV`). ANSI colors are used
/// only when stdout is a terminal. Calling this when a subscriber is already
/// installed keeps the existing subscriber.
pub fn init() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = environment();
        let filter = log_filter(&environment);
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(use_ansi)
            .with_filter(EnvFilter::new(&filter));

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!("tracing subscriber already installed, keeping existing");
        } else {
            tracing::debug!(
                environment = %environment,
                ansi_colors = use_ansi,
                "console logging initialized"
            );
        }
    });
}

fn environment() -> String {
    std::env::var("GANTRY_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn log_filter(environment: &str) -> String {
    if let Ok(filter) = std::env::var("GANTRY_LOG") {
        return filter;
    }
    if let Ok(filter) = std::env::var("RUST_LOG") {
        return filter;
    }
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}
