//! Directory listings and their canonical ordering

use std::path::Path;

use crate::error::StoreError;
use crate::logging::*;
use crate::router::extension_of;

/// One listed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
	pub name: String,
	pub extension: String,
}

impl ListingEntry {
	pub fn new(name: impl Into<String>) -> Self {
		let name = name.into();
		let extension = extension_of(&name).to_string();
		ListingEntry { name, extension }
	}
}

/// Merged listing, grouped by extension class in canonical order
///
/// Entries are grouped in the order of `classes` (local class first, then
/// node classes as declared) and sorted by name within each group. Entries
/// of an undeclared class sort after all declared groups.
#[derive(Debug, Clone)]
pub struct FileListing {
	classes: Vec<String>,
	entries: Vec<ListingEntry>,
}

impl FileListing {
	pub fn new<I, S>(classes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		FileListing { classes: classes.into_iter().map(Into::into).collect(), entries: Vec::new() }
	}

	/// Add one contribution (from the local root or one node)
	pub fn extend<I>(&mut self, names: I)
	where
		I: IntoIterator<Item = String>,
	{
		self.entries.extend(names.into_iter().map(ListingEntry::new));
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Entries in canonical order
	pub fn sorted(&self) -> Vec<&ListingEntry> {
		let mut out: Vec<&ListingEntry> = self.entries.iter().collect();
		out.sort_by(|a, b| {
			self.group(&a.extension)
				.cmp(&self.group(&b.extension))
				.then_with(|| a.name.cmp(&b.name))
		});
		out
	}

	pub fn into_names(self) -> Vec<String> {
		self.sorted().into_iter().map(|e| e.name.clone()).collect()
	}

	fn group(&self, extension: &str) -> usize {
		self.classes.iter().position(|c| c == extension).unwrap_or(self.classes.len())
	}
}

/// Names of regular files directly inside `dir` with the given extension
///
/// `label` is how the directory is named in errors (its virtual path). A
/// missing directory is `DirectoryNotFound`; an existing directory without
/// matches yields an empty list.
pub async fn list_matching(
	dir: &Path,
	extension: &str,
	label: &str,
) -> Result<Vec<String>, StoreError> {
	let not_found = || StoreError::DirectoryNotFound { path: label.to_string() };
	match tokio::fs::metadata(dir).await {
		Ok(meta) if meta.is_dir() => {}
		Ok(_) => return Err(not_found()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
		Err(e) => return Err(e.into()),
	}

	let mut names = Vec::new();
	let mut entries = tokio::fs::read_dir(dir).await?;
	while let Some(entry) = entries.next_entry().await? {
		let file_type = entry.file_type().await?;
		if !file_type.is_file() {
			continue;
		}
		if let Some(name) = entry.file_name().to_str() {
			// Names are sent one per line
			if name.contains(|c: char| c == '\n' || c == '\r') {
				warn!("Skipping unlistable file name {:?} in {}", name, label);
				continue;
			}
			if extension_of(name) == extension {
				names.push(name.to_string());
			}
		}
	}
	names.sort();
	Ok(names)
}


// vim: ts=4
