//! Subscriber setup for the binary. Logs go to stderr; stdout carries the
//! JSON result of each command.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// `SNAPDIFF_LOG_FORMAT=json` selects JSON lines; anything else is text.
    pub fn from_env() -> Self {
        match std::env::var("SNAPDIFF_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

static INIT_ONCE: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(format: LogFormat) {
    INIT_ONCE.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter());
        let _ = match format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
    });
}
