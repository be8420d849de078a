//! Listener plumbing shared by the coordinator and the storage nodes
//!
//! Each accepted connection gets its own task, so a stalled peer only ever
//! blocks the session serving it.

use async_trait::async_trait;
use std::fs;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use crate::error::StoreError;
use crate::logging::*;
use crate::util::is_temp_file;

/// A server that owns one session per accepted connection
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
	/// Name used in logs
	fn name(&self) -> &str;

	/// Run one session to completion; errors are handled inside
	async fn handle(&self, stream: TcpStream, peer: SocketAddr);
}

/// Bind a listener; failure here is fatal for the process
pub async fn bind(address: &str) -> Result<TcpListener, StoreError> {
	TcpListener::bind(address).await.map_err(|e| {
		StoreError::Io(io::Error::new(e.kind(), format!("cannot listen on {}: {}", address, e)))
	})
}

/// Accept connections until `shutdown` resolves
pub async fn serve<H, F>(listener: TcpListener, handler: Arc<H>, shutdown: F) -> Result<(), StoreError>
where
	H: ConnectionHandler,
	F: Future<Output = ()>,
{
	let local = listener.local_addr()?;
	info!("{} listening on {}", handler.name(), local);
	tokio::pin!(shutdown);

	loop {
		tokio::select! {
			_ = &mut shutdown => {
				info!("{} on {} shutting down", handler.name(), local);
				return Ok(());
			}
			accepted = listener.accept() => match accepted {
				Ok((stream, peer)) => {
					debug!("{}: accepted connection from {}", handler.name(), peer);
					if let Err(e) = stream.set_nodelay(true) {
						debug!("set_nodelay failed for {}: {}", peer, e);
					}
					let handler = handler.clone();
					tokio::spawn(async move {
						handler.handle(stream, peer).await;
						debug!("{}: connection from {} closed", handler.name(), peer);
					});
				}
				Err(e) => {
					// Per-connection failures (e.g. reset before accept) must not stop the server
					warn!("{}: accept failed: {}", handler.name(), e);
				}
			}
		}
	}
}

/// Remove staging files left behind by an interrupted run
///
/// Returns the number of files removed. Unreadable directories are skipped.
pub fn cleanup_temp_files(dir: &Path) -> usize {
	fn scan_dir(dir: &Path, count: &mut usize) {
		let entries = match fs::read_dir(dir) {
			Ok(e) => e,
			Err(e) => {
				warn!("Cannot read directory {} during cleanup: {}", dir.display(), e);
				return;
			}
		};

		for entry_result in entries {
			let entry = match entry_result {
				Ok(e) => e,
				Err(e) => {
					debug!("Error reading directory entry during cleanup: {}", e);
					continue;
				}
			};

			let path = entry.path();
			let metadata = match fs::symlink_metadata(&path) {
				Ok(m) => m,
				Err(e) => {
					warn!("Cannot access {} during cleanup: {}", path.display(), e);
					continue;
				}
			};

			if metadata.is_dir() {
				scan_dir(&path, count);
				continue;
			}
			let is_temp = path.file_name().and_then(|n| n.to_str()).map(is_temp_file).unwrap_or(false);
			if metadata.is_file() && is_temp {
				debug!("Removing orphaned staging file: {:?}", path);
				match fs::remove_file(&path) {
					Ok(_) => *count += 1,
					Err(e) if e.kind() == io::ErrorKind::NotFound => {
						debug!("Staging file already removed: {:?}", path);
					}
					Err(e) => warn!("Failed to remove staging file {:?}: {}", path, e),
				}
			}
		}
	}

	let mut count = 0;
	scan_dir(dir, &mut count);
	if count > 0 {
		info!("Cleaned up {} orphaned staging file(s) under {}", count, dir.display());
	}
	count
}


// vim: ts=4
