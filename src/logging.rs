//! Logging initialization. Diagnostics go to stderr; RUST_LOG overrides the defaults.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `verbosity`: 0 = warnings only, 1 = DEBUG for casio, 2+ = TRACE for casio.
pub fn init(verbosity: u8) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let level = match verbosity {
        0 => None,
        1 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    };
    if let Some(level) = level {
        for target in ["casio", "casio_core"] {
            if let Ok(directive) = format!("{target}={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
