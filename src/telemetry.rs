//! Structured logging setup for the command-line tool.

use once_cell::sync::OnceCell;
use std::io::{self, IsTerminal};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceCell<()> = OnceCell::new();

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Another global subscriber already owns the slot
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Default filter for a `-v` count: warn, info, debug, trace.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "anchor_patcher=info",
        2 => "anchor_patcher=debug",
        _ => "anchor_patcher=trace",
    }
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` overrides the verbosity default. Only the first successful call
/// installs anything; later calls return `Ok` without touching global state.
pub fn init(verbosity: u8) -> Result<(), TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install_subscriber(verbosity))
        .map(|_| ())
}

fn install_subscriber(verbosity: u8) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init()
        .map_err(|err| TelemetryError::Subscriber(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(default_filter(2), "anchor_patcher=debug");
        assert_eq!(default_filter(9), "anchor_patcher=trace");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(0).unwrap();
        init(3).unwrap();
    }

    #[test]
    fn test_second_install_is_an_error() {
        init(0).unwrap();
        // The guard is set, so only a direct install can hit the taken slot.
        assert!(matches!(
            install_subscriber(0),
            Err(TelemetryError::Subscriber(_))
        ));
    }
}
