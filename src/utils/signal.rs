//! Signal handling for graceful termination

use tracing::{debug, warn};

/// Resolves when SIGINT or SIGTERM arrives
///
/// If a handler cannot be installed the other one is still awaited; if
/// neither can, this never resolves and the process is left to the default
/// signal disposition.
pub async fn shutdown_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	let sigterm = match signal(SignalKind::terminate()) {
		Ok(stream) => Some(stream),
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}", e);
			None
		}
	};
	let sigint = match signal(SignalKind::interrupt()) {
		Ok(stream) => Some(stream),
		Err(e) => {
			warn!("Failed to setup SIGINT handler: {}", e);
			None
		}
	};

	let term = async {
		match sigterm {
			Some(mut s) => {
				s.recv().await;
			}
			None => std::future::pending::<()>().await,
		}
	};
	let int = async {
		match sigint {
			Some(mut s) => {
				s.recv().await;
			}
			None => std::future::pending::<()>().await,
		}
	};

	tokio::select! {
		_ = term => debug!("Received SIGTERM, shutting down..."),
		_ = int => debug!("Received SIGINT, shutting down..."),
	}
}

// vim: ts=4
