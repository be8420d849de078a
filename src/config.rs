//! Unified configuration for RouteFS
//!
//! One `Config` describes the whole topology: the coordinator, every storage
//! node with the extension class it owns, and the knobs shared by all hops.
//! Every process (coordinator, node, client) loads the same file and picks
//! the part it needs.
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (~/.routefs/config.toml or an explicit --config path, TOML or JSON5)
//! 3. Environment variables (ROUTEFS_* prefix)
//! 4. CLI flags (highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::error::StoreError;

/// Default size of one streamed chunk
pub const DEFAULT_CHUNK_SIZE: usize = 65536;

/// Default limit for a single protocol line
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Unified configuration for all RouteFS processes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// The node clients talk to; also owns the local extension class
	pub coordinator: CoordinatorConfig,

	/// Storage nodes, in the canonical order used for listings
	pub nodes: Vec<NodeConfig>,

	/// Transfer framing parameters
	pub transfer: TransferConfig,

	/// Coordinator-to-node link parameters
	pub network: NetworkConfig,

	/// Serialize Upload/Remove on the same resolved path
	///
	/// Off by default: concurrent uploads to one path are last-writer-wins.
	pub path_locking: bool,

	/// Surface node errors during listing aggregation instead of skipping the node
	pub strict_listing: bool,

	/// Where transient archive bundles are built (defaults to the system temp dir)
	pub scratch_dir: Option<PathBuf>,

	/// Log level (trace, debug, info, warn, error)
	pub log_level: String,

	/// Append log output to this file instead of stderr
	pub log_file: Option<PathBuf>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			coordinator: CoordinatorConfig::default(),
			nodes: vec![
				NodeConfig::new("S2", "pdf", "127.0.0.1:8081").with_archive_name("pdf.tar"),
				NodeConfig::new("S3", "txt", "127.0.0.1:8082").with_archive_name("text.tar"),
				NodeConfig::new("S4", "zip", "127.0.0.1:8083").with_archive_name("zip.tar"),
			],
			transfer: TransferConfig::default(),
			network: NetworkConfig::default(),
			path_locking: false,
			strict_listing: true,
			scratch_dir: None,
			log_level: "info".to_string(),
			log_file: None,
		}
	}
}

impl Config {
	/// Load configuration from an explicit file, or the default location if it exists
	///
	/// Environment overrides are applied on top of whatever was loaded.
	pub fn load(path: Option<&Path>) -> Result<Self, StoreError> {
		let mut config = match path {
			Some(p) => Self::from_file(p)?,
			None => match default_config_path() {
				Some(p) if p.is_file() => Self::from_file(&p)?,
				_ => Self::default(),
			},
		};
		config.apply_env_from(env::vars());
		Ok(config)
	}

	/// Parse a config file; `.json`/`.json5` files are JSON5, anything else TOML
	pub fn from_file(path: &Path) -> Result<Self, StoreError> {
		let text = fs::read_to_string(path).map_err(|e| StoreError::InvalidConfig {
			message: format!("cannot read {}: {}", path.display(), e),
		})?;
		let is_json = matches!(
			path.extension().and_then(|e| e.to_str()),
			Some("json") | Some("json5")
		);
		if is_json {
			Self::from_json5_str(&text)
		} else {
			Self::from_toml_str(&text)
		}
	}

	pub fn from_toml_str(text: &str) -> Result<Self, StoreError> {
		toml::from_str(text).map_err(|e| StoreError::InvalidConfig { message: e.to_string() })
	}

	pub fn from_json5_str(text: &str) -> Result<Self, StoreError> {
		json5::from_str(text).map_err(|e| StoreError::InvalidConfig { message: e.to_string() })
	}

	/// Apply `ROUTEFS_*` overrides from an iterator of environment pairs
	pub fn apply_env_from<I>(&mut self, vars: I)
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (key, value) in vars {
			match key.as_str() {
				// Clients dial the address the coordinator listens on
				"ROUTEFS_LISTEN" | "ROUTEFS_COORDINATOR" => self.coordinator.listen = value,
				"ROUTEFS_ROOT" => self.coordinator.root = PathBuf::from(value),
				"ROUTEFS_LOG_LEVEL" => self.log_level = value,
				"ROUTEFS_LOG_FILE" => self.log_file = Some(PathBuf::from(value)),
				"ROUTEFS_SCRATCH_DIR" => self.scratch_dir = Some(PathBuf::from(value)),
				"ROUTEFS_PATH_LOCKING" => self.path_locking = parse_flag(&value),
				"ROUTEFS_STRICT_LISTING" => self.strict_listing = parse_flag(&value),
				_ => {}
			}
		}
	}

	/// Look up a storage node by its identifier
	pub fn node(&self, id: &str) -> Option<&NodeConfig> {
		self.nodes.iter().find(|n| n.id == id)
	}

	pub fn node_mut(&mut self, id: &str) -> Option<&mut NodeConfig> {
		self.nodes.iter_mut().find(|n| n.id == id)
	}

	/// Every recognized extension, local class first, then nodes in declared order
	pub fn extensions(&self) -> Vec<String> {
		let mut out = vec![self.coordinator.extension.clone()];
		out.extend(self.nodes.iter().map(|n| n.extension.clone()));
		out
	}

	/// Bundle file name a client should use for an archive of `extension`
	pub fn archive_name(&self, extension: &str) -> String {
		if extension == self.coordinator.extension {
			return self.coordinator.archive_name();
		}
		match self.nodes.iter().find(|n| n.extension == extension) {
			Some(node) => node.archive_name(),
			None => format!("{}.tar", extension),
		}
	}

	pub fn scratch_dir(&self) -> PathBuf {
		self.scratch_dir.clone().unwrap_or_else(env::temp_dir)
	}
}

// ============================================================================
// NESTED CONFIGURATION STRUCTS
// ============================================================================

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorConfig {
	/// Identifier used in responses and logs
	pub id: String,

	/// Listen address for client connections
	pub listen: String,

	/// Path prefix clients use to name this tree (e.g. "~/S1")
	pub prefix: String,

	/// Directory the prefix maps to on disk
	pub root: PathBuf,

	/// Extension class kept on the coordinator itself
	pub extension: String,

	/// Bundle name for archives of the local class
	pub archive_name: Option<String>,
}

impl Default for CoordinatorConfig {
	fn default() -> Self {
		CoordinatorConfig {
			id: "S1".to_string(),
			listen: "127.0.0.1:8080".to_string(),
			prefix: "~/S1".to_string(),
			root: home_dir().join("S1"),
			extension: "c".to_string(),
			archive_name: Some("cfiles.tar".to_string()),
		}
	}
}

impl CoordinatorConfig {
	pub fn archive_name(&self) -> String {
		self.archive_name.clone().unwrap_or_else(|| format!("{}.tar", self.extension))
	}
}

/// Storage node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
	/// Node identifier (e.g. "S2")
	pub id: String,

	/// The one extension class this node owns
	pub extension: String,

	/// Address the node listens on and the coordinator connects to
	pub address: String,

	/// Path prefix naming this node's tree (e.g. "~/S2")
	pub prefix: String,

	/// Directory the prefix maps to on the node's host
	pub root: PathBuf,

	/// Bundle name for archives of this class
	pub archive_name: Option<String>,
}

impl Default for NodeConfig {
	fn default() -> Self {
		NodeConfig::new("S2", "pdf", "127.0.0.1:8081")
	}
}

impl NodeConfig {
	/// Create a node entry with prefix `~/<id>` and root `$HOME/<id>`
	pub fn new(id: &str, extension: &str, address: &str) -> Self {
		NodeConfig {
			id: id.to_string(),
			extension: extension.to_string(),
			address: address.to_string(),
			prefix: format!("~/{}", id),
			root: home_dir().join(id),
			archive_name: None,
		}
	}

	pub fn with_archive_name(mut self, name: &str) -> Self {
		self.archive_name = Some(name.to_string());
		self
	}

	pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
		self.root = root.into();
		self
	}

	pub fn archive_name(&self) -> String {
		self.archive_name.clone().unwrap_or_else(|| format!("{}.tar", self.extension))
	}
}

/// Transfer framing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferConfig {
	/// Bytes per streamed chunk
	pub chunk_size: usize,

	/// Longest accepted protocol line; longer lines are rejected
	pub max_line_length: usize,
}

impl Default for TransferConfig {
	fn default() -> Self {
		TransferConfig { chunk_size: DEFAULT_CHUNK_SIZE, max_line_length: DEFAULT_MAX_LINE_LENGTH }
	}
}

/// Coordinator-to-node link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkConfig {
	/// Connect timeout in seconds (0 disables)
	pub connect_timeout_secs: u64,

	/// Per-read/write timeout in seconds on node links (0 disables)
	pub io_timeout_secs: u64,
}

impl Default for NetworkConfig {
	fn default() -> Self {
		NetworkConfig { connect_timeout_secs: 5, io_timeout_secs: 30 }
	}
}

impl NetworkConfig {
	pub fn connect_timeout(&self) -> Option<Duration> {
		secs(self.connect_timeout_secs)
	}

	pub fn io_timeout(&self) -> Option<Duration> {
		secs(self.io_timeout_secs)
	}
}

fn secs(value: u64) -> Option<Duration> {
	if value == 0 {
		None
	} else {
		Some(Duration::from_secs(value))
	}
}

fn parse_flag(value: &str) -> bool {
	matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn home_dir() -> PathBuf {
	env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// `~/.routefs/config.toml`, if HOME is known
pub fn default_config_path() -> Option<PathBuf> {
	env::var("HOME").ok().map(|h| PathBuf::from(h).join(".routefs").join("config.toml"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_default_topology() {
		let config = Config::default();
		assert_eq!(config.coordinator.extension, "c");
		assert_eq!(config.coordinator.prefix, "~/S1");
		assert_eq!(config.extensions(), vec!["c", "pdf", "txt", "zip"]);
		assert_eq!(config.node("S3").map(|n| n.extension.as_str()), Some("txt"));
		assert!(config.strict_listing);
		assert!(!config.path_locking);
	}

	#[test]
	fn test_archive_names() {
		let config = Config::default();
		assert_eq!(config.archive_name("c"), "cfiles.tar");
		assert_eq!(config.archive_name("pdf"), "pdf.tar");
		assert_eq!(config.archive_name("txt"), "text.tar");
		assert_eq!(config.archive_name("md"), "md.tar");
	}

	#[test]
	fn test_network_timeouts() {
		let net = NetworkConfig { connect_timeout_secs: 0, io_timeout_secs: 7 };
		assert!(net.connect_timeout().is_none());
		assert_eq!(net.io_timeout(), Some(Duration::from_secs(7)));
	}

	#[test]
	fn test_env_overrides() {
		let mut config = Config::default();
		config.apply_env_from(vec![
			("ROUTEFS_LISTEN".to_string(), "0.0.0.0:9000".to_string()),
			("ROUTEFS_PATH_LOCKING".to_string(), "yes".to_string()),
			("ROUTEFS_STRICT_LISTING".to_string(), "false".to_string()),
			("UNRELATED".to_string(), "x".to_string()),
		]);
		assert_eq!(config.coordinator.listen, "0.0.0.0:9000");
		assert!(config.path_locking);
		assert!(!config.strict_listing);
	}

	#[test]
	fn test_config_serialization() {
		let config = Config::default();
		let json = serde_json::to_string(&config).expect("Failed to serialize");
		let deserialized: Config = serde_json::from_str(&json).expect("Failed to deserialize");
		assert_eq!(config.coordinator.listen, deserialized.coordinator.listen);
		assert_eq!(config.nodes.len(), deserialized.nodes.len());
	}
}

// vim: ts=4
