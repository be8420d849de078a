//! Staging files
//!
//! Incoming data is written next to its destination under a temporary name
//! and renamed into place once complete. Anything left behind by a crash is
//! recognizable by its suffix and swept at startup.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix carried by every staging file
pub const TEMP_SUFFIX: &str = ".rfs-tmp";

/// Staging location for `dest`: a hidden sibling with a unique name
pub fn staging_path(dest: &Path) -> PathBuf {
	let mut name = OsString::from(".");
	if let Some(file_name) = dest.file_name() {
		name.push(file_name);
		name.push(".");
	}
	name.push(uuid::Uuid::new_v4().to_string());
	name.push(TEMP_SUFFIX);
	dest.with_file_name(name)
}

pub fn is_temp_file(name: &str) -> bool {
	name.ends_with(TEMP_SUFFIX)
}

/// A file that is removed when dropped unless persisted
#[derive(Debug)]
pub struct TempPath {
	path: Option<PathBuf>,
}

impl TempPath {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		TempPath { path: Some(path.into()) }
	}

	/// Staging file for `dest`, see [`staging_path`]
	pub fn staging_for(dest: &Path) -> Self {
		TempPath::new(staging_path(dest))
	}

	pub fn path(&self) -> &Path {
		self.path.as_deref().unwrap_or_else(|| Path::new(""))
	}

	/// Rename the file to `dest`, replacing whatever is there
	///
	/// On failure the staging file is removed.
	pub async fn persist(mut self, dest: &Path) -> io::Result<()> {
		let path = match self.path.take() {
			Some(p) => p,
			None => return Err(io::Error::new(io::ErrorKind::NotFound, "staging file already gone")),
		};
		match tokio::fs::rename(&path, dest).await {
			Ok(()) => {
				debug!("Moved {} into place at {}", path.display(), dest.display());
				Ok(())
			}
			Err(e) => {
				self.path = Some(path);
				Err(e)
			}
		}
	}
}

impl Drop for TempPath {
	fn drop(&mut self) {
		if let Some(path) = self.path.take() {
			match std::fs::remove_file(&path) {
				Ok(()) => debug!("Removed staging file {}", path.display()),
				Err(e) if e.kind() == io::ErrorKind::NotFound => {}
				Err(e) => warn!("Failed to remove staging file {}: {}", path.display(), e),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_staging_path_is_hidden_sibling() {
		let staged = staging_path(Path::new("/srv/s1/docs/a.c"));
		assert_eq!(staged.parent(), Some(Path::new("/srv/s1/docs")));
		let name = staged.file_name().unwrap().to_str().unwrap();
		assert!(name.starts_with(".a.c."));
		assert!(is_temp_file(name));
		assert_ne!(staged, staging_path(Path::new("/srv/s1/docs/a.c")));
	}

	#[test]
	fn test_drop_removes_file() {
		let dir = TempDir::new().unwrap();
		let temp = TempPath::staging_for(&dir.path().join("x.c"));
		std::fs::write(temp.path(), b"partial").unwrap();
		let path = temp.path().to_path_buf();
		drop(temp);
		assert!(!path.exists());
	}

	#[tokio::test]
	async fn test_persist_moves_into_place() {
		let dir = TempDir::new().unwrap();
		let dest = dir.path().join("x.c");
		std::fs::write(&dest, b"old").unwrap();
		let temp = TempPath::staging_for(&dest);
		std::fs::write(temp.path(), b"new").unwrap();
		let staged = temp.path().to_path_buf();

		temp.persist(&dest).await.unwrap();
		assert_eq!(std::fs::read(&dest).unwrap(), b"new");
		assert!(!staged.exists());
	}
}

// vim: ts=4
