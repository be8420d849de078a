//! Per-path advisory locks
//!
//! When enabled, Upload and Remove hold a lock keyed by the resolved
//! destination path for the whole command, so two sessions writing the same
//! file are serialized. When disabled the guards are no-ops and concurrent
//! writers are last-writer-wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct PathLocks {
	enabled: bool,
	locks: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

/// Held for the duration of one command
#[derive(Debug)]
pub struct PathGuard {
	_guard: Option<OwnedMutexGuard<()>>,
}

impl PathLocks {
	pub fn new(enabled: bool) -> Self {
		PathLocks { enabled, locks: Arc::new(Mutex::new(HashMap::new())) }
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Wait for exclusive use of `path`
	pub async fn acquire(&self, path: &Path) -> PathGuard {
		if !self.enabled {
			return PathGuard { _guard: None };
		}
		let lock = {
			let mut locks = match self.locks.lock() {
				Ok(l) => l,
				Err(poisoned) => poisoned.into_inner(),
			};
			// Drop entries nobody holds or waits on
			locks.retain(|_, l| Arc::strong_count(l) > 1);
			locks.entry(path.to_path_buf()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
		};
		trace!("Locking {}", path.display());
		PathGuard { _guard: Some(lock.lock_owned().await) }
	}
}


// vim: ts=4
