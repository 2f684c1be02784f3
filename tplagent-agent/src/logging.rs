//! Tracing subscriber bootstrap from the agent's log configuration.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFmt, LogLevel};

pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

/// Install the global subscriber. The first generation wins; reloads and
/// tests that re-enter keep the existing subscriber.
pub fn init(level: LogLevel, fmt: LogFmt) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(level).into())
        .from_env_lossy();

    let result = match fmt {
        LogFmt::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        LogFmt::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
    };
    let _ = result;
}
