//! Tracing subscriber setup
//!
//! Libraries only emit `tracing` events; the subscriber is installed here,
//! once, by whoever owns the process.

use tracing_subscriber::filter::LevelFilter;

/// Parses a level name, falling back to `info`
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse::<LevelFilter>().unwrap_or(LevelFilter::INFO)
}

/// Installs a formatting subscriber at the given level
///
/// Returns false when a global subscriber is already set; calling this more
/// than once is harmless.
pub fn init_tracing(level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(parse_level(level))
        .with_target(false)
        .try_init()
        .is_ok()
}
