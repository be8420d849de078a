//! Shared harness: a coordinator and its storage nodes on loopback ports

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use routefs::client::Client;
use routefs::config::Config;
use routefs::coordinator::Coordinator;
use routefs::node::StorageNode;
use routefs::serve::{self, ConnectionHandler};

/// Counts accepted connections before handing them to the wrapped handler
pub struct Counting<H> {
	inner: H,
	pub accepted: Arc<AtomicUsize>,
}

#[async_trait]
impl<H: ConnectionHandler> ConnectionHandler for Counting<H> {
	fn name(&self) -> &str {
		self.inner.name()
	}

	async fn handle(&self, stream: TcpStream, peer: SocketAddr) {
		self.accepted.fetch_add(1, Ordering::SeqCst);
		self.inner.handle(stream, peer).await;
	}
}

pub struct Cluster {
	pub config: Config,
	pub base: TempDir,
	pub out: TempDir,
	node_hits: HashMap<String, Arc<AtomicUsize>>,
	_shutdown: Vec<oneshot::Sender<()>>,
}

impl Cluster {
	/// Coordinator plus every default node
	pub async fn start() -> Cluster {
		Cluster::launch(HashMap::new()).await
	}

	/// Like `start`, but nodes named in `overrides` are not started; the
	/// coordinator is pointed at the given address instead
	pub async fn launch(overrides: HashMap<&str, String>) -> Cluster {
		let base = TempDir::new().unwrap();
		let out = TempDir::new().unwrap();
		let mut config = Config::default();
		config.coordinator.root = base.path().join("S1");
		config.scratch_dir = Some(base.path().join("scratch"));
		config.transfer.chunk_size = 4096;
		config.network.connect_timeout_secs = 2;
		config.network.io_timeout_secs = 5;

		let mut shutdown = Vec::new();
		let mut node_hits = HashMap::new();
		let ids: Vec<String> = config.nodes.iter().map(|n| n.id.clone()).collect();
		for id in ids {
			let root = base.path().join(&id);
			if let Some(address) = overrides.get(id.as_str()) {
				let node = config.node_mut(&id).unwrap();
				node.address = address.clone();
				node.root = root;
				continue;
			}
			let listener = serve::bind("127.0.0.1:0").await.unwrap();
			{
				let node = config.node_mut(&id).unwrap();
				node.address = listener.local_addr().unwrap().to_string();
				node.root = root;
			}
			let node = StorageNode::new(config.node(&id).unwrap(), &config);
			node.prepare().await.unwrap();
			let accepted = Arc::new(AtomicUsize::new(0));
			node_hits.insert(id.clone(), accepted.clone());
			let (tx, rx) = oneshot::channel::<()>();
			shutdown.push(tx);
			tokio::spawn(serve::serve(listener, Arc::new(Counting { inner: node, accepted }), async {
				let _ = rx.await;
			}));
		}

		let listener = serve::bind("127.0.0.1:0").await.unwrap();
		config.coordinator.listen = listener.local_addr().unwrap().to_string();
		let coordinator = Coordinator::new(&config);
		coordinator.prepare().await.unwrap();
		let (tx, rx) = oneshot::channel::<()>();
		shutdown.push(tx);
		tokio::spawn(serve::serve(listener, Arc::new(coordinator), async {
			let _ = rx.await;
		}));

		Cluster { config, base, out, node_hits, _shutdown: shutdown }
	}

	pub async fn client(&self) -> Client {
		Client::connect(&self.config).await.unwrap()
	}

	/// On-disk root of a node or the coordinator ("S1")
	pub fn root(&self, id: &str) -> PathBuf {
		self.base.path().join(id)
	}

	pub fn node_connections(&self, id: &str) -> usize {
		self.node_hits.get(id).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0)
	}

	pub fn total_node_connections(&self) -> usize {
		self.node_hits.values().map(|c| c.load(Ordering::SeqCst)).sum()
	}

	/// Write a file to upload into a scratch source directory
	pub fn source_file(&self, name: &str, content: &[u8]) -> PathBuf {
		let dir = self.base.path().join("client-src");
		std::fs::create_dir_all(&dir).unwrap();
		let path = dir.join(name);
		std::fs::write(&path, content).unwrap();
		path
	}
}

/// All regular files under `dir`, relative, sorted
pub fn files_under(dir: &Path) -> Vec<String> {
	fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) {
		if let Ok(entries) = std::fs::read_dir(dir) {
			for entry in entries.flatten() {
				let path = entry.path();
				if path.is_dir() {
					walk(base, &path, out);
				} else if path.is_file() {
					out.push(path.strip_prefix(base).unwrap().to_string_lossy().into_owned());
				}
			}
		}
	}
	let mut out = Vec::new();
	walk(dir, dir, &mut out);
	out.sort();
	out
}

/// Poll `check` for up to two seconds
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
	for _ in 0..100 {
		if check() {
			return true;
		}
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
	}
	check()
}

/// Deterministic test payload spanning several chunks
pub fn payload(len: usize) -> Vec<u8> {
	(0..len).map(|i| (i * 31 % 251) as u8).collect()
}

// vim: ts=4
