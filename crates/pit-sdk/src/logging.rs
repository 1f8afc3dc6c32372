//! Tracing setup for task processes and the `pit-call` CLI.
//!
//! Logs go to stderr so stdout stays free for task output.
//!
//! - a valid `RUST_LOG` wins
//! - otherwise `PIT_LOG` picks the level for pit crates (default `info`)
//! - `LOG_FORMAT=json` switches to one JSON object per line

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_LEVEL_ENV: &str = "PIT_LOG";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init_tracing() {
    let filter = build_filter(
        std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
        std::env::var(LOG_LEVEL_ENV).ok().as_deref(),
    );
    let format = LogFormat::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref());

    // Exactly one of the two layers is present.
    let json = (format == LogFormat::Json).then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text = (format == LogFormat::Text).then(|| fmt::layer().with_writer(std::io::stderr));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init();
}

/// `RUST_LOG` directives when present and parseable, else the pit defaults.
fn build_filter(rust_log: Option<&str>, pit_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(pit_log)))
}

fn default_directives(pit_log: Option<&str>) -> String {
    let level = match pit_log.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        Some("off") => "off",
        _ => "info",
    };
    format!("pit_sdk={level},pit_call={level}")
}
