//! Log subscriber setup for the `mb` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary. Output goes to stderr so stdout stays parseable.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a full filter directive, e.g. `microbeads=debug`.
pub const LOG_ENV_VAR: &str = "MB_LOG";

/// Default level for a `-v` count, falling back to the configured level.
pub fn level_from_verbosity(verbosity: u8, configured: &str) -> LevelFilter {
    match verbosity {
        0 => configured.parse().unwrap_or(LevelFilter::WARN),
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbosity: u8, configured_level: &str) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity, configured_level).into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_overrides_configured_level() {
        assert_eq!(level_from_verbosity(0, "error"), LevelFilter::ERROR);
        assert_eq!(level_from_verbosity(0, "nonsense"), LevelFilter::WARN);
        assert_eq!(level_from_verbosity(1, "error"), LevelFilter::INFO);
        assert_eq!(level_from_verbosity(2, "warn"), LevelFilter::DEBUG);
        assert_eq!(level_from_verbosity(5, "warn"), LevelFilter::TRACE);
    }
}
