//! Path validation functions

use std::path::{Component, Path};

use super::ValidationError;

/// Check if a path is safe (no parent directory references)
///
/// Ensures paths cannot escape a managed root using ".." references.
pub fn is_path_safe(path: &Path) -> bool {
	!path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Validate a path is safe
///
/// # Returns
/// `Ok(())` if valid, `Err(ValidationError)` if path contains dangerous components
pub fn validate_path_safe(path: &Path) -> Result<(), ValidationError> {
	if !is_path_safe(path) {
		return Err(ValidationError::path(
			path.display().to_string(),
			"path contains parent directory reference (..)",
		));
	}
	Ok(())
}

/// Check if path has no absolute components
pub fn is_path_relative(path: &Path) -> bool {
	!path.is_absolute() && !path.has_root()
}

/// Validate that path is relative (not absolute)
pub fn validate_path_relative(path: &Path) -> Result<(), ValidationError> {
	if !is_path_relative(path) {
		return Err(ValidationError::path(path.display().to_string(), "path must be relative"));
	}
	Ok(())
}

/// Validate a path that will be joined onto a managed root
///
/// Only plain names (and `.`) are accepted, so the joined result can never
/// leave the root regardless of how the root itself is spelled.
pub fn validate_contained_path(path: &Path) -> Result<(), ValidationError> {
	validate_path_relative(path)?;
	validate_path_safe(path)?;
	for component in path.components() {
		match component {
			Component::Normal(_) | Component::CurDir => {}
			_ => {
				return Err(ValidationError::path(
					path.display().to_string(),
					"path contains a non-plain component",
				))
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_is_path_safe_normal() {
		assert!(is_path_safe(Path::new("file.txt")));
		assert!(is_path_safe(Path::new("dir/file.txt")));
		assert!(is_path_safe(Path::new("a/b/c/file.txt")));
	}

	#[test]
	fn test_is_path_safe_with_parent() {
		assert!(!is_path_safe(Path::new("../file.txt")));
		assert!(!is_path_safe(Path::new("dir/../file.txt")));
		assert!(!is_path_safe(Path::new("a/b/../../file.txt")));
	}

	#[test]
	fn test_validate_path_safe_err() {
		let result = validate_path_safe(Path::new("../etc/passwd"));
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("parent directory"));
	}

	#[test]
	fn test_validate_path_relative() {
		assert!(validate_path_relative(Path::new("dir/file.txt")).is_ok());
		let result = validate_path_relative(Path::new("/absolute/path"));
		assert!(result.unwrap_err().to_string().contains("must be relative"));
	}

	#[test]
	fn test_validate_contained_path() {
		assert!(validate_contained_path(Path::new("")).is_ok());
		assert!(validate_contained_path(Path::new("a/./b.c")).is_ok());
		assert!(validate_contained_path(Path::new("a/../../b.c")).is_err());
		assert!(validate_contained_path(Path::new("/etc")).is_err());
	}
}

// vim: ts=4
