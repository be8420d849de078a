//! Logging prelude module for convenient access to tracing macros.
//!
//! This module provides convenient re-exports of common tracing macros
//! to reduce verbosity and maintain consistency across the codebase.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("This is an info message");
//! warn!("This is a warning");
//! error!("An error occurred");
//! debug!("Debug information");
//! ```

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

pub use tracing::{debug, error, info, trace, warn};

use crate::error::StoreError;

/// Initialize the tracing subscriber with environment filter support.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (from the config's
/// `logLevel`) applies. Output goes to stderr, or is appended to `log_file`
/// when one is configured:
///
/// ```bash
/// RUST_LOG=debug routefs coordinator
/// RUST_LOG=routefs::coordinator=trace routefs coordinator
/// ```
pub fn init_tracing(default_level: &str, log_file: Option<&Path>) -> Result<(), StoreError> {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

	let result = match log_file {
		Some(path) => {
			let file = OpenOptions::new().create(true).append(true).open(path).map_err(|e| {
				StoreError::InvalidConfig {
					message: format!("cannot open log file {}: {}", path.display(), e),
				}
			})?;
			tracing_subscriber::fmt()
				.with_env_filter(filter)
				.with_ansi(false)
				.with_writer(Mutex::new(file))
				.try_init()
		}
		None => tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
	};
	result.map_err(|e| StoreError::InvalidConfig { message: format!("logging setup failed: {}", e) })
}

// vim: ts=4
