//! Archive bundles
//!
//! A bundle holds every file of one extension class under a root, with names
//! relative to that root. Bundles are transient: built on demand in a scratch
//! directory, streamed once, then removed when their [`TempPath`] drops.

use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::util::{TempPath, TEMP_SUFFIX};

/// Builds a bundle of the files matching one extension
#[async_trait]
pub trait Archiver: Send + Sync {
	async fn build(&self, root: &Path, extension: &str) -> Result<TempPath, StoreError>;
}

/// Tar bundles built in a scratch directory
#[derive(Debug, Clone)]
pub struct TarArchiver {
	scratch: PathBuf,
}

impl TarArchiver {
	pub fn new(scratch: impl Into<PathBuf>) -> Self {
		TarArchiver { scratch: scratch.into() }
	}
}

#[async_trait]
impl Archiver for TarArchiver {
	async fn build(&self, root: &Path, extension: &str) -> Result<TempPath, StoreError> {
		tokio::fs::create_dir_all(&self.scratch).await?;
		let bundle = TempPath::new(
			self.scratch.join(format!("{}-{}.tar{}", extension, uuid::Uuid::new_v4(), TEMP_SUFFIX)),
		);
		let matcher = extension_matcher(extension)?;
		let root = root.to_path_buf();
		let target = bundle.path().to_path_buf();

		let count = tokio::task::spawn_blocking(move || build_bundle(&root, &matcher, &target))
			.await
			.map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e)))??;
		debug!("Built bundle {} with {} file(s)", bundle.path().display(), count);
		Ok(bundle)
	}
}

/// Matcher for file names carrying `extension` (at least one character before the dot)
pub fn extension_matcher(extension: &str) -> Result<GlobMatcher, StoreError> {
	let glob = Glob::new(&format!("?*.{}", extension))
		.map_err(|e| StoreError::malformed(format!("bad extension {:?}: {}", extension, e)))?;
	Ok(glob.compile_matcher())
}

/// Write a tar of every matching file under `root` to `target`
///
/// Returns the number of files added. A missing root gives an empty bundle.
pub fn build_bundle(root: &Path, matcher: &GlobMatcher, target: &Path) -> io::Result<usize> {
	let mut files = Vec::new();
	if root.is_dir() {
		collect(root, matcher, &mut files)?;
	}
	files.sort();

	let out = fs::File::create(target)?;
	let mut builder = tar::Builder::new(out);
	for path in &files {
		let rel = path.strip_prefix(root).unwrap_or(path);
		builder.append_path_with_name(path, rel)?;
	}
	builder.into_inner()?.sync_all()?;
	Ok(files.len())
}

fn collect(dir: &Path, matcher: &GlobMatcher, out: &mut Vec<PathBuf>) -> io::Result<()> {
	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		let path = entry.path();
		let file_type = match entry.file_type() {
			Ok(t) => t,
			Err(e) => {
				warn!("Cannot stat {} while archiving: {}", path.display(), e);
				continue;
			}
		};
		if file_type.is_dir() {
			collect(&path, matcher, out)?;
		} else if file_type.is_file() && matcher.is_match(entry.file_name()) {
			out.push(path);
		}
	}
	Ok(())
}


// vim: ts=4
