//! Storage node
//!
//! A node owns exactly one extension class and one managed root. It serves
//! `STORE`, `FETCH`, `DELETE`, `ARCHIVE` and `LIST` requests, one at a time
//! per connection. A request it cannot satisfy is answered with a typed
//! `ERROR` line; the connection is only dropped when the byte stream itself
//! can no longer be trusted.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::archive::{Archiver, TarArchiver};
use crate::config::{Config, NodeConfig, TransferConfig};
use crate::error::StoreError;
use crate::listing::list_matching;
use crate::logging::*;
use crate::paths::ManagedRoot;
use crate::protocol::response::write_response;
use crate::protocol::transfer::{self, FrameHeader};
use crate::protocol::{Connection, NodeRequest, Response, READY};
use crate::router::extension_of;
use crate::serve::{cleanup_temp_files, ConnectionHandler};
use crate::util::TempPath;
use crate::utils::PathLocks;

pub struct StorageNode {
	id: String,
	extension: String,
	root: ManagedRoot,
	transfer: TransferConfig,
	archiver: Arc<dyn Archiver>,
	locks: PathLocks,
}

impl StorageNode {
	pub fn new(node: &NodeConfig, config: &Config) -> Self {
		StorageNode {
			id: node.id.clone(),
			extension: node.extension.clone(),
			root: ManagedRoot::new(node.prefix.clone(), node.root.clone()),
			transfer: config.transfer.clone(),
			archiver: Arc::new(TarArchiver::new(config.scratch_dir())),
			locks: PathLocks::new(config.path_locking),
		}
	}

	pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
		self.archiver = archiver;
		self
	}

	/// Create the root directory and sweep leftover staging files
	///
	/// Failing to create the root is fatal for the node.
	pub async fn prepare(&self) -> Result<(), StoreError> {
		let dir = self.root.dir().to_path_buf();
		tokio::fs::create_dir_all(&dir)
			.await
			.map_err(|source| StoreError::WriteFailure { path: dir.display().to_string(), source })?;
		let swept = tokio::task::spawn_blocking(move || cleanup_temp_files(&dir))
			.await
			.map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
		info!(
			"Storage node {} ready: .{} files under {} ({} stale staging file(s) removed)",
			self.id,
			self.extension,
			self.root.dir().display(),
			swept
		);
		Ok(())
	}

	/// Serve requests on one connection until it closes
	pub async fn run_session<S>(&self, conn: &mut Connection<S>)
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		loop {
			let line = match conn.read_line().await {
				Ok(Some(line)) => line,
				Ok(None) => break,
				Err(e) if e.breaks_connection() => {
					debug!("{}: session with {} ended: {}", self.id, conn.peer(), e);
					break;
				}
				Err(e) => {
					if reply_error(conn, &e).await.is_err() {
						break;
					}
					continue;
				}
			};

			let request = match NodeRequest::parse(&line) {
				Ok(request) => request,
				Err(e) => {
					if reply_error(conn, &e).await.is_err() {
						break;
					}
					continue;
				}
			};

			debug!("{}: {} from {}", self.id, request, conn.peer());
			if let Err(e) = self.dispatch(conn, request).await {
				if e.breaks_connection() {
					warn!("{}: dropping connection with {}: {}", self.id, conn.peer(), e);
					break;
				}
				debug!("{}: request failed: {}", self.id, e);
			}
		}
	}

	/// Handle one request to completion
	///
	/// By the time this returns the peer has received every line the request
	/// owes it. A returned error is for logging, and for deciding whether
	/// the connection can carry another request.
	pub async fn dispatch<S>(&self, conn: &mut Connection<S>, request: NodeRequest) -> Result<(), StoreError>
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		match request {
			NodeRequest::Store { path } => self.store(conn, &path).await,
			NodeRequest::Fetch { path } => self.fetch(conn, &path).await,
			NodeRequest::Delete { path } => self.delete(conn, &path).await,
			NodeRequest::Archive => self.archive(conn).await,
			NodeRequest::List { path } => self.list_owned(conn, &path).await,
		}
	}

	async fn store<S>(&self, conn: &mut Connection<S>, path: &str) -> Result<(), StoreError>
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		let dest = match self.resolve_owned_file(path) {
			Ok(dest) => dest,
			Err(e) => return reply_error(conn, &e).await.and(Err(e)),
		};
		if let Some(parent) = dest.parent() {
			if let Err(source) = tokio::fs::create_dir_all(parent).await {
				let e = StoreError::WriteFailure { path: path.to_string(), source };
				return reply_error(conn, &e).await.and(Err(e));
			}
		}

		let _guard = self.locks.acquire(&dest).await;
		conn.write_line(READY).await?;

		let staging = TempPath::staging_for(&dest);
		let result = match transfer::read_header(conn).await? {
			FrameHeader::Size(size) => {
				match transfer::receive_file(conn, staging.path(), size, self.transfer.chunk_size).await {
					Ok(n) => staging.persist(&dest).await.map(|_| n).map_err(|source| {
						StoreError::WriteFailure { path: path.to_string(), source }
					}),
					Err(e) => Err(e),
				}
			}
			FrameHeader::NotFound => Err(StoreError::FileNotFound { path: path.to_string() }),
			FrameHeader::Error { kind, message } => Err(StoreError::Remote { kind, message }),
		};

		match result {
			Ok(n) => {
				info!("{}: stored {} ({} bytes)", self.id, path, n);
				write_response(conn, &Response::success(format!("File stored at {}", path))).await
			}
			Err(e) if e.breaks_connection() => Err(e),
			Err(e) => reply_error(conn, &e).await.and(Err(e)),
		}
	}

	async fn fetch<S>(&self, conn: &mut Connection<S>, path: &str) -> Result<(), StoreError>
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		let source = match self.resolve_owned_file(path) {
			Ok(source) => source,
			Err(e) => {
				transfer::write_header(conn, &FrameHeader::error(&e)).await?;
				return Err(e);
			}
		};
		match transfer::send_file(conn, &source, self.transfer.chunk_size).await {
			Ok(n) => {
				info!("{}: sent {} ({} bytes)", self.id, path, n);
				Ok(())
			}
			Err(StoreError::FileNotFound { .. }) => {
				Err(StoreError::FileNotFound { path: path.to_string() })
			}
			Err(e) => Err(e),
		}
	}

	async fn delete<S>(&self, conn: &mut Connection<S>, path: &str) -> Result<(), StoreError>
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		let target = match self.resolve_owned_file(path) {
			Ok(target) => target,
			Err(e) => return reply_error(conn, &e).await.and(Err(e)),
		};
		let _guard = self.locks.acquire(&target).await;
		match remove_regular_file(&target, path).await {
			Ok(()) => {
				info!("{}: deleted {}", self.id, path);
				write_response(conn, &Response::success(format!("File {} deleted", path))).await
			}
			Err(e) => reply_error(conn, &e).await.and(Err(e)),
		}
	}

	async fn archive<S>(&self, conn: &mut Connection<S>) -> Result<(), StoreError>
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		let bundle = match self.archiver.build(self.root.dir(), &self.extension).await {
			Ok(bundle) => bundle,
			Err(e) => {
				error!("{}: cannot build .{} bundle: {}", self.id, self.extension, e);
				transfer::write_header(conn, &FrameHeader::error(&e)).await?;
				return Err(e);
			}
		};
		let sent = transfer::send_file(conn, bundle.path(), self.transfer.chunk_size).await?;
		info!("{}: sent .{} bundle ({} bytes)", self.id, self.extension, sent);
		Ok(())
	}

	async fn list_owned<S>(&self, conn: &mut Connection<S>, path: &str) -> Result<(), StoreError>
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		let listed = match self.root.resolve(path) {
			Ok(dir) => list_matching(&dir, &self.extension, path).await,
			Err(e) => Err(e),
		};
		match listed {
			Ok(names) => write_response(conn, &Response::Listing(names)).await,
			Err(e) => reply_error(conn, &e).await.and(Err(e)),
		}
	}

	/// Resolve a file path, requiring this node's extension and a file name
	fn resolve_owned_file(&self, path: &str) -> Result<PathBuf, StoreError> {
		let extension = extension_of(path);
		if extension != self.extension {
			return Err(StoreError::UnsupportedExtension { extension: extension.to_string() });
		}
		let resolved = self.root.resolve(path)?;
		if resolved == self.root.dir() {
			return Err(StoreError::InvalidPath {
				path: path.to_string(),
				reason: "names the root, not a file".to_string(),
			});
		}
		Ok(resolved)
	}
}

#[async_trait]
impl ConnectionHandler for StorageNode {
	fn name(&self) -> &str {
		&self.id
	}

	async fn handle(&self, stream: TcpStream, peer: SocketAddr) {
		let mut conn =
			Connection::new(stream, peer.to_string()).with_max_line(self.transfer.max_line_length);
		self.run_session(&mut conn).await;
	}
}

/// Remove a regular file; a missing file or a directory is `FileNotFound`
pub async fn remove_regular_file(target: &Path, label: &str) -> Result<(), StoreError> {
	let not_found = || StoreError::FileNotFound { path: label.to_string() };
	match tokio::fs::symlink_metadata(target).await {
		Ok(meta) if meta.is_dir() => return Err(not_found()),
		Ok(_) => {}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
		Err(e) => return Err(e.into()),
	}
	match tokio::fs::remove_file(target).await {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
		Err(source) => Err(StoreError::WriteFailure { path: label.to_string(), source }),
	}
}

/// Send an `ERROR` line for `err`
async fn reply_error<S>(conn: &mut Connection<S>, err: &StoreError) -> Result<(), StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	write_response(conn, &Response::error(err)).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;
	use crate::protocol::response::{expect_ready, expect_success, read_listing};
	use tempfile::TempDir;

	fn node(root: &Path) -> StorageNode {
		let mut config = Config::default();
		config.scratch_dir = Some(root.join(".scratch"));
		let node_config = NodeConfig::new("S2", "pdf", "127.0.0.1:0").with_root(root);
		StorageNode::new(&node_config, &config)
	}

	fn session(node: StorageNode) -> Connection<tokio::io::DuplexStream> {
		let (a, b) = tokio::io::duplex(64 * 1024);
		tokio::spawn(async move {
			let mut conn = Connection::new(b, "coordinator");
			node.run_session(&mut conn).await;
		});
		Connection::new(a, "node")
	}

	#[tokio::test]
	async fn test_store_creates_directories_and_file() {
		let root = TempDir::new().unwrap();
		let mut conn = session(node(root.path()));

		conn.write_line("STORE ~/S2/a/b/doc.pdf").await.unwrap();
		expect_ready(&mut conn).await.unwrap();
		transfer::write_header(&mut conn, &FrameHeader::Size(5)).await.unwrap();
		expect_ready(&mut conn).await.unwrap();
		conn.write_all(b"hello").await.unwrap();
		conn.flush().await.unwrap();
		let msg = expect_success(&mut conn).await.unwrap();
		assert!(msg.contains("~/S2/a/b/doc.pdf"));

		assert_eq!(std::fs::read(root.path().join("a/b/doc.pdf")).unwrap(), b"hello");
	}

	#[tokio::test]
	async fn test_store_rejects_foreign_extension_before_ready() {
		let root = TempDir::new().unwrap();
		let mut conn = session(node(root.path()));

		conn.write_line("STORE ~/S2/notes.txt").await.unwrap();
		let err = expect_ready(&mut conn).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnsupportedExtension);

		// Same connection still serves the next request
		conn.write_line("LIST ~/S2").await.unwrap();
		assert!(read_listing(&mut conn).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_fetch_and_delete() {
		let root = TempDir::new().unwrap();
		std::fs::write(root.path().join("x.pdf"), b"pdf-bytes").unwrap();
		let mut conn = session(node(root.path()));
		let out = TempDir::new().unwrap();
		let dest = out.path().join("x.pdf");

		conn.write_line("FETCH ~/S2/x.pdf").await.unwrap();
		transfer::receive_frame(&mut conn, "~/S2/x.pdf", &dest, 1024).await.unwrap();
		assert_eq!(std::fs::read(&dest).unwrap(), b"pdf-bytes");

		conn.write_line("DELETE ~/S2/x.pdf").await.unwrap();
		expect_success(&mut conn).await.unwrap();
		assert!(!root.path().join("x.pdf").exists());

		conn.write_line("DELETE ~/S2/x.pdf").await.unwrap();
		assert_eq!(expect_success(&mut conn).await.unwrap_err().kind(), ErrorKind::FileNotFound);

		let missing = out.path().join("gone.pdf");
		conn.write_line("FETCH ~/S2/x.pdf").await.unwrap();
		let err = transfer::receive_frame(&mut conn, "~/S2/x.pdf", &missing, 1024).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::FileNotFound);
		assert!(!missing.exists());
	}

	#[tokio::test]
	async fn test_list_owned_only() {
		let root = TempDir::new().unwrap();
		std::fs::create_dir(root.path().join("docs")).unwrap();
		std::fs::write(root.path().join("docs/b.pdf"), b"b").unwrap();
		std::fs::write(root.path().join("docs/a.pdf"), b"a").unwrap();
		std::fs::write(root.path().join("docs/c.txt"), b"c").unwrap();
		let mut conn = session(node(root.path()));

		conn.write_line("LIST ~/S2/docs").await.unwrap();
		assert_eq!(read_listing(&mut conn).await.unwrap(), vec!["a.pdf", "b.pdf"]);

		conn.write_line("LIST ~/S2/none").await.unwrap();
		let err = read_listing(&mut conn).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::DirectoryNotFound);
	}

	#[tokio::test]
	async fn test_malformed_request_keeps_session() {
		let root = TempDir::new().unwrap();
		let mut conn = session(node(root.path()));

		conn.write_line("EXPLODE now").await.unwrap();
		let err = expect_success(&mut conn).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::MalformedCommand);

		conn.write_line("LIST ~/S2/../..").await.unwrap();
		assert_eq!(read_listing(&mut conn).await.unwrap_err().kind(), ErrorKind::InvalidPath);
	}

	/// Archiver whose scratch space is unusable
	struct BrokenArchiver;

	#[async_trait]
	impl Archiver for BrokenArchiver {
		async fn build(&self, _root: &Path, extension: &str) -> Result<TempPath, StoreError> {
			Err(StoreError::WriteFailure {
				path: format!("{}.tar", extension),
				source: std::io::Error::new(std::io::ErrorKind::Other, "scratch full"),
			})
		}
	}

	#[tokio::test]
	async fn test_archive_failure_becomes_error_header() {
		let root = TempDir::new().unwrap();
		std::fs::write(root.path().join("a.pdf"), b"a").unwrap();
		let mut conn = session(node(root.path()).with_archiver(Arc::new(BrokenArchiver)));

		conn.write_line("ARCHIVE").await.unwrap();
		match transfer::read_header(&mut conn).await.unwrap() {
			FrameHeader::Error { kind, message } => {
				assert_eq!(kind, ErrorKind::WriteFailure);
				assert!(message.contains("pdf.tar"), "{}", message);
			}
			other => panic!("expected error header, got {:?}", other),
		}

		conn.write_line("LIST ~/S2").await.unwrap();
		assert_eq!(read_listing(&mut conn).await.unwrap(), vec!["a.pdf"]);
	}

	#[tokio::test]
	async fn test_prepare_creates_root() {
		let base = TempDir::new().unwrap();
		let root = base.path().join("nested/S2");
		let n = node(&root);
		n.prepare().await.unwrap();
		assert!(root.is_dir());
	}
}

// vim: ts=4
