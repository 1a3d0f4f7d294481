#![forbid(unsafe_code)]

//! File logging for live sessions.
//!
//! The terminal being driven owns stdout and stderr, so logs go to a file.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "TGLASS_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Build the filter from `TGLASS_LOG`, defaulting to `info`.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install a global subscriber that appends to `path`.
///
/// With the `tracing-json` feature each record is one JSON object per line.
///
/// # Errors
///
/// Fails if the file cannot be opened or a global subscriber is already set.
pub fn init_file_logging(path: impl AsRef<Path>) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    #[cfg(feature = "tracing-json")]
    let result = builder.json().try_init();
    #[cfg(not(feature = "tracing-json"))]
    let result = builder.try_init();

    result.map_err(io::Error::other)
}
