//! Logging utilities
//!
//! Provides logging setup and configuration.

use env_logger::{Builder, Env};
use std::io::Write;

/// Setup logging for the server.
///
/// `RUST_LOG` selects the filter and defaults to `info`. Lines look like
/// `[2024-06-01T12:00:00.000Z] [INFO] message`.
pub fn setup_logging() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .init();
}
