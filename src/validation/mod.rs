//! Centralized validation for RouteFS
//!
//! This module provides common validation functions and traits for:
//! - Configuration validation (topology, extensions, limits)
//! - Path validation (safety, containment within a managed root)

use std::error::Error;
use std::fmt;

pub mod config;
pub mod path;

pub use config::*;
pub use path::*;

/// Generic validation error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	/// Invalid configuration
	ConfigError(String),
	/// Invalid path
	PathError { path: String, reason: String },
}

impl ValidationError {
	pub(crate) fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
		ValidationError::PathError { path: path.into(), reason: reason.into() }
	}
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::ConfigError(msg) => write!(f, "Config validation error: {}", msg),
			ValidationError::PathError { path, reason } => {
				write!(f, "Path validation error: {}: {}", path, reason)
			}
		}
	}
}

impl Error for ValidationError {}

/// Trait for validatable types
pub trait Validator {
	/// Validate this type
	/// Returns Ok(()) if valid, Err(ValidationError) if invalid
	fn validate(&self) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validation_error_display() {
		let err = ValidationError::ConfigError("test error".to_string());
		assert!(err.to_string().contains("Config validation error"));

		let err = ValidationError::path("~/S9/x", "outside managed root");
		assert!(err.to_string().contains("~/S9/x"));
		assert!(err.to_string().contains("outside managed root"));
	}

	#[test]
	fn test_validation_error_equality() {
		let err1 = ValidationError::path("a", "test");
		let err2 = ValidationError::path("a", "test");
		assert_eq!(err1, err2);
	}
}

// vim: ts=4
