//! Coordinator
//!
//! The coordinator is the only server clients talk to. For every command it
//! consults the router table, then either serves the request from its own
//! managed root (the local extension class) or proxies it to the storage
//! node that owns the extension. Listings are aggregated across all nodes.
//!
//! Each client connection runs the session state machine
//! `AwaitCommand -> Dispatch -> Respond -> AwaitCommand`, ending in `Closed`
//! on disconnect or when the byte stream can no longer be trusted. Links to
//! storage nodes are opened per sub-request and closed right after.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::archive::{Archiver, TarArchiver};
use crate::config::{Config, NetworkConfig, TransferConfig};
use crate::error::StoreError;
use crate::listing::{list_matching, FileListing};
use crate::logging::*;
use crate::node::remove_regular_file;
use crate::paths::ManagedRoot;
use crate::protocol::response::{self, write_response};
use crate::protocol::transfer::{self, FrameHeader};
use crate::protocol::{Command, Connection, NodeRequest, Response, READY};
use crate::router::{extension_of, NodeRoute, Placement, RouterTable};
use crate::serve::{cleanup_temp_files, ConnectionHandler};
use crate::util::TempPath;
use crate::utils::PathLocks;

/// Where a client session stands
#[derive(Debug)]
pub enum SessionState {
	AwaitCommand,
	Dispatch(Command),
	Respond(Outcome),
	Closed,
}

/// Result of dispatching one command
#[derive(Debug)]
pub enum Outcome {
	/// Terminal response still to be written
	Reply(Response),
	/// Everything owed to the client has been written
	Done,
	/// The client connection must be closed
	Broken(StoreError),
}

impl Outcome {
	fn from_result(result: Result<Response, StoreError>) -> Self {
		match result {
			Ok(response) => Outcome::Reply(response),
			Err(e) if e.breaks_connection() => Outcome::Broken(e),
			Err(e) => Outcome::Reply(Response::error(&e)),
		}
	}

	/// For commands whose output was streamed as it was produced
	fn streamed(result: Result<(), StoreError>) -> Self {
		match result {
			Err(e) if e.breaks_connection() => Outcome::Broken(e),
			_ => Outcome::Done,
		}
	}
}

pub struct Coordinator {
	id: String,
	root: ManagedRoot,
	router: RouterTable,
	transfer: TransferConfig,
	network: NetworkConfig,
	strict_listing: bool,
	archiver: Arc<dyn Archiver>,
	locks: PathLocks,
}

impl Coordinator {
	pub fn new(config: &Config) -> Self {
		Coordinator {
			id: config.coordinator.id.clone(),
			root: ManagedRoot::new(config.coordinator.prefix.clone(), config.coordinator.root.clone()),
			router: RouterTable::from_config(config),
			transfer: config.transfer.clone(),
			network: config.network.clone(),
			strict_listing: config.strict_listing,
			archiver: Arc::new(TarArchiver::new(config.scratch_dir())),
			locks: PathLocks::new(config.path_locking),
		}
	}

	pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
		self.archiver = archiver;
		self
	}

	/// Create the local root and sweep leftover staging files
	pub async fn prepare(&self) -> Result<(), StoreError> {
		let dir = self.root.dir().to_path_buf();
		tokio::fs::create_dir_all(&dir)
			.await
			.map_err(|source| StoreError::WriteFailure { path: dir.display().to_string(), source })?;
		let swept = tokio::task::spawn_blocking(move || cleanup_temp_files(&dir))
			.await
			.map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
		info!(
			"Coordinator {} ready: root {}, classes {:?} ({} stale staging file(s) removed)",
			self.id,
			self.root.dir().display(),
			self.router.classes(),
			swept
		);
		Ok(())
	}

	/// Run one client session to completion
	pub async fn run_session<S>(&self, conn: &mut Connection<S>)
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		let mut state = SessionState::AwaitCommand;
		loop {
			state = match state {
				SessionState::AwaitCommand => match conn.read_line().await {
					Ok(Some(line)) => match Command::parse(&line) {
						Ok(command) => SessionState::Dispatch(command),
						Err(e) => SessionState::Respond(Outcome::Reply(Response::error(&e))),
					},
					Ok(None) => SessionState::Closed,
					Err(e) if e.breaks_connection() => {
						debug!("Session with {} ended: {}", conn.peer(), e);
						SessionState::Closed
					}
					Err(e) => SessionState::Respond(Outcome::Reply(Response::error(&e))),
				},
				SessionState::Dispatch(command) => {
					info!("{}: {}", conn.peer(), command);
					SessionState::Respond(self.dispatch(conn, command).await)
				}
				SessionState::Respond(outcome) => match outcome {
					Outcome::Reply(response) => {
						if let Response::Error { message, .. } = &response {
							debug!("{}: {}", conn.peer(), message);
						}
						match write_response(conn, &response).await {
							Ok(()) => SessionState::AwaitCommand,
							Err(e) => {
								debug!("Cannot answer {}: {}", conn.peer(), e);
								SessionState::Closed
							}
						}
					}
					Outcome::Done => SessionState::AwaitCommand,
					Outcome::Broken(e) => {
						warn!("Closing connection with {}: {}", conn.peer(), e);
						let _ = conn.shutdown().await;
						SessionState::Closed
					}
				},
				SessionState::Closed => break,
			};
		}
	}

	/// Execute one command
	pub async fn dispatch<S>(&self, conn: &mut Connection<S>, command: Command) -> Outcome
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		match command {
			Command::Upload { name, dest } => self.upload(conn, &name, &dest).await,
			Command::Download { path } => self.download(conn, &path).await,
			Command::Remove { path } => Outcome::from_result(self.remove(&path).await),
			Command::Archive { extension } => self.archive(conn, &extension).await,
			Command::ListNames { path } => Outcome::from_result(self.list_names(&path).await),
		}
	}

	// ------------------------------------------------------------------------
	// Upload
	// ------------------------------------------------------------------------

	async fn upload<S>(&self, conn: &mut Connection<S>, name: &str, dest: &str) -> Outcome
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		// Extension first: nothing is read from the client for a doomed upload
		let base = match Path::new(name).file_name().and_then(|n| n.to_str()) {
			Some(base) => base.to_string(),
			None => {
				let extension = extension_of(name).to_string();
				return Outcome::Reply(Response::error(&StoreError::UnsupportedExtension { extension }));
			}
		};
		let placement = self.router.route(extension_of(&base));
		if placement == Placement::Unsupported {
			let extension = extension_of(&base).to_string();
			return Outcome::Reply(Response::error(&StoreError::UnsupportedExtension { extension }));
		}

		let (dir, virtual_dest) = match self.root.relative(dest) {
			Ok(rel) => (self.root.dir().join(&rel), self.root.virtual_path(&rel.join(&base))),
			Err(e) => return Outcome::Reply(Response::error(&e)),
		};
		if let Err(source) = tokio::fs::create_dir_all(&dir).await {
			let e = StoreError::WriteFailure { path: dest.to_string(), source };
			return Outcome::Reply(Response::error(&e));
		}
		let local_dest = dir.join(&base);

		let _guard = self.locks.acquire(&local_dest).await;
		if let Err(e) = conn.write_line(READY).await {
			return Outcome::Broken(e);
		}

		let staging = match self.receive_upload(conn, &local_dest, &virtual_dest).await {
			Ok(staging) => staging,
			Err(e) => return Outcome::from_result(Err(e)),
		};

		let result = match placement {
			Placement::Node(id) => match self.router.node(id) {
				Some(node) => self.relocate(node, staging, &local_dest, &virtual_dest).await,
				None => Err(StoreError::UnsupportedExtension { extension: extension_of(&base).into() }),
			},
			_ => match staging.persist(&local_dest).await {
				Ok(()) => Ok(virtual_dest.clone()),
				Err(source) => Err(StoreError::WriteFailure { path: virtual_dest.clone(), source }),
			},
		};
		match result {
			Ok(stored_at) => {
				info!("Stored {} at {}", base, stored_at);
				Outcome::Reply(Response::success(format!("File uploaded to {}", stored_at)))
			}
			Err(e) => Outcome::from_result(Err(e)),
		}
	}

	/// Receive the client's frame into a staging file next to `local_dest`
	async fn receive_upload<S>(
		&self,
		conn: &mut Connection<S>,
		local_dest: &Path,
		virtual_dest: &str,
	) -> Result<TempPath, StoreError>
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		let size = match transfer::read_header(conn).await? {
			FrameHeader::Size(size) => size,
			FrameHeader::NotFound => {
				return Err(StoreError::FileNotFound { path: virtual_dest.to_string() })
			}
			FrameHeader::Error { kind, message } => return Err(StoreError::Remote { kind, message }),
		};
		let staging = TempPath::staging_for(local_dest);
		transfer::receive_file(conn, staging.path(), size, self.transfer.chunk_size).await?;
		Ok(staging)
	}

	/// Move a staged upload to its owning node
	///
	/// On success the staging copy is removed. On failure it is kept at the
	/// local destination so the data is not lost, and the error says where.
	async fn relocate(
		&self,
		node: &NodeRoute,
		staging: TempPath,
		local_dest: &Path,
		virtual_dest: &str,
	) -> Result<String, StoreError> {
		let node_path = self.root.rewrite(virtual_dest, &node.prefix)?;
		match self.store_on_node(node, &node_path, staging.path()).await {
			Ok(()) => Ok(node_path),
			Err(e) => {
				warn!("Cannot relocate {} to {}: {}", virtual_dest, node.id, e);
				let kept = match staging.persist(local_dest).await {
					Ok(()) => format!("file kept at {}", virtual_dest),
					Err(persist_err) => {
						error!("Cannot keep {}: {}", virtual_dest, persist_err);
						"local copy could not be kept".to_string()
					}
				};
				Err(StoreError::Remote { kind: e.kind(), message: format!("{}; {}", e, kept) })
			}
		}
	}

	async fn store_on_node(&self, node: &NodeRoute, node_path: &str, staged: &Path) -> Result<(), StoreError> {
		let mut link = self.connect(node).await?;
		let request = NodeRequest::Store { path: node_path.to_string() };
		let result = async {
			link.write_line(&request.to_string()).await?;
			response::expect_ready(&mut link).await?;
			if let Err(e) = transfer::send_file(&mut link, staged, self.transfer.chunk_size).await {
				if e.breaks_connection() {
					return Err(e);
				}
				// The node still sends its terminal response
			}
			response::expect_success(&mut link).await.map(|_| ())
		}
		.await;
		result.map_err(|e| link_error(node, e))
	}

	// ------------------------------------------------------------------------
	// Download and Archive
	// ------------------------------------------------------------------------

	async fn download<S>(&self, conn: &mut Connection<S>, path: &str) -> Outcome
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		let extension = extension_of(path);
		let placement = self.router.route(extension);
		if placement == Placement::Unsupported {
			let e = StoreError::UnsupportedExtension { extension: extension.to_string() };
			return refuse_frame(conn, &e).await;
		}
		let resolved = match self.resolve_file(path) {
			Ok(resolved) => resolved,
			Err(e) => return refuse_frame(conn, &e).await,
		};

		match placement {
			Placement::Node(id) => {
				let node = match self.router.node(id) {
					Some(node) => node,
					None => {
						let e = StoreError::UnsupportedExtension { extension: extension.to_string() };
						return refuse_frame(conn, &e).await;
					}
				};
				let node_path = match self.root.rewrite(path, &node.prefix) {
					Ok(p) => p,
					Err(e) => return refuse_frame(conn, &e).await,
				};
				self.relay_from_node(conn, node, NodeRequest::Fetch { path: node_path }).await
			}
			_ => {
				let result = transfer::send_file(conn, &resolved, self.transfer.chunk_size).await;
				if let Err(e) = &result {
					debug!("Download of {} failed: {}", path, e);
				}
				Outcome::streamed(result.map(|_| ()))
			}
		}
	}

	async fn archive<S>(&self, conn: &mut Connection<S>, extension: &str) -> Outcome
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		match self.router.route(extension) {
			Placement::Local => {
				let bundle = match self.archiver.build(self.root.dir(), extension).await {
					Ok(bundle) => bundle,
					Err(e) => {
						error!("Cannot build .{} bundle: {}", extension, e);
						return refuse_frame(conn, &e).await;
					}
				};
				let result = transfer::send_file(conn, bundle.path(), self.transfer.chunk_size).await;
				Outcome::streamed(result.map(|_| ()))
			}
			Placement::Node(id) => match self.router.node(id) {
				Some(node) => self.relay_from_node(conn, node, NodeRequest::Archive).await,
				None => {
					let e = StoreError::UnsupportedExtension { extension: extension.to_string() };
					refuse_frame(conn, &e).await
				}
			},
			Placement::Unsupported => {
				let e = StoreError::UnsupportedExtension { extension: extension.to_string() };
				refuse_frame(conn, &e).await
			}
		}
	}

	/// Issue a frame-producing request to a node and pass its frame through
	///
	/// The size header goes to the client first; the node is only told to
	/// stream once the client is ready, and bytes are forwarded as they
	/// arrive. A stream cut short after the header was forwarded leaves the
	/// client short of bytes, so its connection is closed.
	async fn relay_from_node<S>(&self, client: &mut Connection<S>, node: &NodeRoute, request: NodeRequest) -> Outcome
	where
		S: AsyncRead + AsyncWrite + Unpin + Send,
	{
		let opened = async {
			let mut link = self.connect(node).await?;
			link.write_line(&request.to_string()).await?;
			let header = transfer::read_header(&mut link).await?;
			Ok::<_, StoreError>((link, header))
		}
		.await;
		let (mut link, header) = match opened {
			Ok(opened) => opened,
			Err(e) => return refuse_frame(client, &link_error(node, e)).await,
		};

		let size = match header {
			FrameHeader::Size(size) => size,
			other => {
				debug!("{} answered {} with {:?}", node.id, request, other);
				return Outcome::streamed(transfer::write_header(client, &other).await);
			}
		};
		if let Err(e) = transfer::write_header(client, &FrameHeader::Size(size)).await {
			return Outcome::Broken(e);
		}

		let reply = match client.read_line().await {
			Ok(Some(line)) => line,
			Ok(None) => return Outcome::Broken(StoreError::Disconnected),
			Err(e) => return Outcome::Broken(e),
		};
		if reply != READY {
			// Client refused the frame; tell the node so it stops waiting
			let _ = link.write_line(&reply).await;
			return match Response::parse(&reply) {
				Ok(Response::Error { .. }) => Outcome::Done,
				_ => Outcome::Broken(StoreError::protocol(format!("expected READY, got {:?}", reply))),
			};
		}
		if let Err(e) = link.write_line(READY).await {
			return Outcome::Broken(link_error(node, e));
		}

		match transfer::relay(&mut link, client, size, self.transfer.chunk_size).await {
			Ok(n) => {
				debug!("Relayed {} bytes from {} to {}", n, node.id, client.peer());
				Outcome::Done
			}
			Err(e) => Outcome::Broken(e),
		}
	}

	// ------------------------------------------------------------------------
	// Remove and ListNames
	// ------------------------------------------------------------------------

	async fn remove(&self, path: &str) -> Result<Response, StoreError> {
		let extension = extension_of(path);
		let placement = self.router.route(extension);
		if placement == Placement::Unsupported {
			return Err(StoreError::UnsupportedExtension { extension: extension.to_string() });
		}
		let resolved = self.resolve_file(path)?;

		match placement {
			Placement::Node(id) => {
				let node = self
					.router
					.node(id)
					.ok_or_else(|| StoreError::UnsupportedExtension { extension: extension.to_string() })?;
				let node_path = self.root.rewrite(path, &node.prefix)?;
				self.delete_on_node(node, &node_path).await?;
			}
			_ => {
				let _guard = self.locks.acquire(&resolved).await;
				remove_regular_file(&resolved, path).await?;
			}
		}
		info!("Removed {}", path);
		Ok(Response::success(format!("File {} removed", path)))
	}

	async fn delete_on_node(&self, node: &NodeRoute, node_path: &str) -> Result<(), StoreError> {
		let mut link = self.connect(node).await?;
		let request = NodeRequest::Delete { path: node_path.to_string() };
		let result = async {
			link.write_line(&request.to_string()).await?;
			response::expect_success(&mut link).await.map(|_| ())
		}
		.await;
		result.map_err(|e| link_error(node, e))
	}

	async fn list_names(&self, path: &str) -> Result<Response, StoreError> {
		let dir = self.root.resolve(path)?;
		// A directory missing locally is an error; nodes are not contacted
		let local = list_matching(&dir, self.router.local_extension(), path).await?;

		let mut listing = FileListing::new(self.router.classes());
		listing.extend(local);
		for (_, node) in self.router.nodes() {
			let node_path = self.root.rewrite(path, &node.prefix)?;
			match self.list_on_node(node, &node_path).await {
				Ok(names) => listing.extend(names),
				Err(e) if e.kind() == crate::error::ErrorKind::DirectoryNotFound => {
					debug!("{} has no {}", node.id, node_path);
				}
				Err(e) if self.strict_listing => return Err(e),
				Err(e) => warn!("Skipping {} in listing of {}: {}", node.id, path, e),
			}
		}
		Ok(Response::Listing(listing.into_names()))
	}

	async fn list_on_node(&self, node: &NodeRoute, node_path: &str) -> Result<Vec<String>, StoreError> {
		let mut link = self.connect(node).await?;
		let request = NodeRequest::List { path: node_path.to_string() };
		let result = async {
			link.write_line(&request.to_string()).await?;
			response::read_listing(&mut link).await
		}
		.await;
		result.map_err(|e| link_error(node, e))
	}

	// ------------------------------------------------------------------------
	// Helpers
	// ------------------------------------------------------------------------

	async fn connect(&self, node: &NodeRoute) -> Result<Connection<TcpStream>, StoreError> {
		match Connection::connect(&node.address, &self.network).await {
			Ok(link) => Ok(link.with_max_line(self.transfer.max_line_length)),
			Err(e) => Err(StoreError::NodeUnreachable { node: node.id.clone(), reason: e.to_string() }),
		}
	}

	/// Resolve a path naming a file (not the root itself) in the local tree
	fn resolve_file(&self, path: &str) -> Result<PathBuf, StoreError> {
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
impl ConnectionHandler for Coordinator {
	fn name(&self) -> &str {
		&self.id
	}

	async fn handle(&self, stream: TcpStream, peer: SocketAddr) {
		let mut conn =
			Connection::new(stream, peer.to_string()).with_max_line(self.transfer.max_line_length);
		self.run_session(&mut conn).await;
	}
}

/// Errors that cut a node link short mean the node is unreachable; errors
/// the node reported keep their own kind
fn link_error(node: &NodeRoute, e: StoreError) -> StoreError {
	if e.breaks_connection() {
		StoreError::NodeUnreachable { node: node.id.clone(), reason: e.to_string() }
	} else {
		e
	}
}

/// Put an error token where a frame's size header would go
async fn refuse_frame<S>(conn: &mut Connection<S>, err: &StoreError) -> Outcome
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	debug!("Refusing frame to {}: {}", conn.peer(), err);
	Outcome::streamed(transfer::write_header(conn, &FrameHeader::error(err)).await)
}


// vim: ts=4
