//! Managed roots and prefix rewriting
//!
//! Clients name files with virtual paths such as `~/S1/docs/a.pdf`. The
//! prefix (`~/S1`) names a tree; the rest is a relative path inside it. When
//! a request is proxied, the prefix is swapped for the target node's own
//! prefix and the relative part is carried over untouched.

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::validation::validate_contained_path;

/// A virtual prefix bound to a directory on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRoot {
	prefix: String,
	dir: PathBuf,
}

impl ManagedRoot {
	pub fn new(prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
		ManagedRoot { prefix: prefix.into(), dir: dir.into() }
	}

	pub fn prefix(&self) -> &str {
		&self.prefix
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Relative part of a virtual path, validated to stay inside the root
	///
	/// The root itself yields an empty path.
	pub fn relative(&self, path: &str) -> Result<PathBuf, StoreError> {
		let rest = path.strip_prefix(self.prefix.as_str()).ok_or_else(|| {
			StoreError::InvalidPath {
				path: path.to_string(),
				reason: format!("must start with {}", self.prefix),
			}
		})?;
		let rest = match rest {
			"" => "",
			r if r.starts_with('/') => r.trim_start_matches('/'),
			_ => {
				return Err(StoreError::InvalidPath {
					path: path.to_string(),
					reason: format!("must start with {}/", self.prefix),
				})
			}
		};
		let relative = PathBuf::from(rest);
		validate_contained_path(&relative)?;
		Ok(relative)
	}

	/// Absolute location on disk for a virtual path
	pub fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
		Ok(self.dir.join(self.relative(path)?))
	}

	/// Virtual path for a location relative to this root
	pub fn virtual_path(&self, relative: &Path) -> String {
		let rel = relative.to_string_lossy();
		let rel = rel.trim_start_matches("./");
		if rel.is_empty() || rel == "." {
			self.prefix.clone()
		} else {
			format!("{}/{}", self.prefix, rel)
		}
	}

	/// The same relative location under another tree's prefix
	pub fn rewrite(&self, path: &str, target_prefix: &str) -> Result<String, StoreError> {
		let relative = self.relative(path)?;
		Ok(ManagedRoot::new(target_prefix, PathBuf::new()).virtual_path(&relative))
	}
}


// vim: ts=4
