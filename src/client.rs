//! Client session
//!
//! One connection to the coordinator, one command per request/response
//! cycle. Payloads use the same transfer frames as every other hop.
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load(None)?;
//! let mut client = Client::connect(&config).await?;
//! client.upload(Path::new("report.pdf"), "~/S1/reports").await?;
//! let names = client.list("~/S1/reports").await?;
//! ```

use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::error::StoreError;
use crate::logging::*;
use crate::protocol::response;
use crate::protocol::transfer::{self, FrameHeader};
use crate::protocol::{Command, Connection};
use crate::router::extension_of;
use crate::util::TempPath;

pub struct Client<S = TcpStream> {
	conn: Connection<S>,
	config: Config,
}

impl Client<TcpStream> {
	/// Connect to the coordinator named in the configuration
	pub async fn connect(config: &Config) -> Result<Self, StoreError> {
		let address = config.coordinator.listen.clone();
		Self::connect_to(&address, config).await
	}

	pub async fn connect_to(address: &str, config: &Config) -> Result<Self, StoreError> {
		let mut network = config.network.clone();
		// Listings and bundles may take a while to assemble server-side
		network.io_timeout_secs = 0;
		let conn = Connection::connect(address, &network).await.map_err(|e| {
			StoreError::NodeUnreachable { node: config.coordinator.id.clone(), reason: e.to_string() }
		})?;
		debug!("Connected to coordinator at {}", address);
		Ok(Client::new(conn, config))
	}
}

impl<S> Client<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	pub fn new(conn: Connection<S>, config: &Config) -> Self {
		let conn = conn.with_max_line(config.transfer.max_line_length);
		Client { conn, config: config.clone() }
	}

	/// Upload a local file into the directory `dest`
	///
	/// The file must exist and carry one of the configured extensions; both
	/// are checked before anything is sent.
	pub async fn upload(&mut self, local: &Path, dest: &str) -> Result<String, StoreError> {
		let name = local.file_name().and_then(|n| n.to_str()).ok_or_else(|| StoreError::InvalidPath {
			path: local.display().to_string(),
			reason: "no file name".to_string(),
		})?;
		let extension = extension_of(name);
		if !self.config.extensions().iter().any(|e| e == extension) {
			return Err(StoreError::UnsupportedExtension { extension: extension.to_string() });
		}
		match tokio::fs::metadata(local).await {
			Ok(meta) if meta.is_file() => {}
			_ => return Err(StoreError::FileNotFound { path: local.display().to_string() }),
		}

		let command = Command::Upload { name: name.to_string(), dest: dest.to_string() };
		self.conn.write_line(&command.to_string()).await?;
		response::expect_ready(&mut self.conn).await?;

		if let Err(e) = transfer::send_file(&mut self.conn, local, self.config.transfer.chunk_size).await {
			if e.breaks_connection() {
				return Err(e);
			}
			// Frame aborted; the coordinator still answers with a terminal line
			return match response::expect_success(&mut self.conn).await {
				Err(terminal) if !terminal.breaks_connection() => Err(terminal),
				_ => Err(e),
			};
		}
		response::expect_success(&mut self.conn).await
	}

	/// Download `path` into `out_dir`, saved under its base name
	///
	/// Nothing is created locally unless the coordinator sends a file.
	pub async fn download(&mut self, path: &str, out_dir: &Path) -> Result<PathBuf, StoreError> {
		let name = Path::new(path).file_name().ok_or_else(|| StoreError::InvalidPath {
			path: path.to_string(),
			reason: "no file name".to_string(),
		})?;
		let dest = out_dir.join(name);
		let command = Command::Download { path: path.to_string() };
		self.fetch_frame(&command, path, &dest).await?;
		Ok(dest)
	}

	/// Download the bundle of every `extension` file into `out_dir`
	pub async fn archive(&mut self, extension: &str, out_dir: &Path) -> Result<PathBuf, StoreError> {
		let dest = out_dir.join(self.config.archive_name(extension));
		let command = Command::Archive { extension: extension.to_string() };
		self.fetch_frame(&command, extension, &dest).await?;
		Ok(dest)
	}

	pub async fn remove(&mut self, path: &str) -> Result<String, StoreError> {
		let command = Command::Remove { path: path.to_string() };
		self.conn.write_line(&command.to_string()).await?;
		response::expect_success(&mut self.conn).await
	}

	/// Names of the files in `path`, across all nodes, in canonical order
	pub async fn list(&mut self, path: &str) -> Result<Vec<String>, StoreError> {
		let command = Command::ListNames { path: path.to_string() };
		self.conn.write_line(&command.to_string()).await?;
		response::read_listing(&mut self.conn).await
	}

	async fn fetch_frame(&mut self, command: &Command, source: &str, dest: &Path) -> Result<u64, StoreError> {
		self.conn.write_line(&command.to_string()).await?;
		let size = match transfer::read_header(&mut self.conn).await? {
			FrameHeader::Size(size) => size,
			FrameHeader::NotFound => return Err(StoreError::FileNotFound { path: source.to_string() }),
			FrameHeader::Error { kind, message } => return Err(StoreError::Remote { kind, message }),
		};
		let staging = TempPath::staging_for(dest);
		let received =
			transfer::receive_file(&mut self.conn, staging.path(), size, self.config.transfer.chunk_size).await?;
		staging
			.persist(dest)
			.await
			.map_err(|source| StoreError::WriteFailure { path: dest.display().to_string(), source })?;
		debug!("Saved {} ({} bytes)", dest.display(), received);
		Ok(received)
	}
}


// vim: ts=4
