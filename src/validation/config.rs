//! Configuration validation functions

use std::collections::HashSet;

use super::{ValidationError, Validator};
use crate::config::Config;

/// Smallest chunk worth streaming
pub const MIN_CHUNK_SIZE: usize = 512;

/// Largest chunk buffer we allocate per transfer
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Validate the streamed chunk size
pub fn validate_chunk_size(size: usize) -> Result<(), ValidationError> {
	if size < MIN_CHUNK_SIZE {
		return Err(ValidationError::ConfigError(format!(
			"chunkSize must be at least {}, got {}",
			MIN_CHUNK_SIZE, size
		)));
	}
	if size > MAX_CHUNK_SIZE {
		return Err(ValidationError::ConfigError(format!(
			"chunkSize must be at most {}, got {}",
			MAX_CHUNK_SIZE, size
		)));
	}
	Ok(())
}

/// Validate the protocol line limit
pub fn validate_line_length(len: usize) -> Result<(), ValidationError> {
	if len < 64 {
		return Err(ValidationError::ConfigError(format!(
			"maxLineLength must be at least 64, got {}",
			len
		)));
	}
	Ok(())
}

/// Validate timeout in seconds (0 disables the timeout)
pub fn validate_timeout_secs(timeout_secs: u64) -> Result<(), ValidationError> {
	if timeout_secs > 3600 {
		return Err(ValidationError::ConfigError(format!(
			"Timeout too large: {} seconds (max 3600)",
			timeout_secs
		)));
	}
	Ok(())
}

/// Validate an extension class name: bare, non-empty, alphanumeric
pub fn validate_extension(extension: &str) -> Result<(), ValidationError> {
	if extension.is_empty() {
		return Err(ValidationError::ConfigError("Extension must not be empty".to_string()));
	}
	if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
		return Err(ValidationError::ConfigError(format!(
			"Extension must be a bare alphanumeric token, got {:?}",
			extension
		)));
	}
	Ok(())
}

/// Validate a managed-root prefix such as "~/S1"
pub fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
	if prefix.is_empty() || prefix.ends_with('/') || prefix.contains(char::is_whitespace) {
		return Err(ValidationError::ConfigError(format!(
			"Prefix must be non-empty, without trailing slash or whitespace, got {:?}",
			prefix
		)));
	}
	if prefix.split('/').any(|part| part == "..") {
		return Err(ValidationError::ConfigError(format!(
			"Prefix must not contain '..', got {:?}",
			prefix
		)));
	}
	Ok(())
}

impl Validator for Config {
	fn validate(&self) -> Result<(), ValidationError> {
		validate_chunk_size(self.transfer.chunk_size)?;
		validate_line_length(self.transfer.max_line_length)?;
		validate_timeout_secs(self.network.connect_timeout_secs)?;
		validate_timeout_secs(self.network.io_timeout_secs)?;
		validate_extension(&self.coordinator.extension)?;
		validate_prefix(&self.coordinator.prefix)?;

		let mut extensions = HashSet::new();
		let mut ids = HashSet::new();
		let mut prefixes = HashSet::new();
		extensions.insert(self.coordinator.extension.as_str());
		ids.insert(self.coordinator.id.as_str());
		prefixes.insert(self.coordinator.prefix.as_str());

		for node in &self.nodes {
			validate_extension(&node.extension)?;
			validate_prefix(&node.prefix)?;
			if node.address.is_empty() {
				return Err(ValidationError::ConfigError(format!(
					"Node {} has no address",
					node.id
				)));
			}
			if !extensions.insert(node.extension.as_str()) {
				return Err(ValidationError::ConfigError(format!(
					"Extension {} is owned by more than one node",
					node.extension
				)));
			}
			if !ids.insert(node.id.as_str()) {
				return Err(ValidationError::ConfigError(format!("Duplicate node id {}", node.id)));
			}
			if !prefixes.insert(node.prefix.as_str()) {
				return Err(ValidationError::ConfigError(format!(
					"Duplicate node prefix {}",
					node.prefix
				)));
			}
		}
		Ok(())
	}
}


// vim: ts=4
