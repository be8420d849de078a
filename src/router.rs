//! Router table: extension to placement
//!
//! Placement is derived, never stored. The table is built once from the
//! configuration and consulted once per command; lookups have no side effects.

use std::collections::HashMap;

use crate::config::{Config, NodeConfig};

/// Extension of a file name: the text after the last `.` of its final
/// component, or empty when there is none
///
/// A leading dot (".profile") does not start an extension.
pub fn extension_of(name: &str) -> &str {
	let base = name.rsplit('/').next().unwrap_or(name);
	match base.rfind('.') {
		None | Some(0) => "",
		Some(i) => &base[i + 1..],
	}
}

/// Index of a storage node in the table's canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Routing decision for one extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
	/// Kept on the coordinator
	Local,
	/// Owned by the given storage node
	Node(NodeId),
	/// No class owns this extension
	Unsupported,
}

/// Everything the coordinator needs to reach one storage node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRoute {
	pub id: String,
	pub extension: String,
	pub address: String,
	pub prefix: String,
}

impl From<&NodeConfig> for NodeRoute {
	fn from(node: &NodeConfig) -> Self {
		NodeRoute {
			id: node.id.clone(),
			extension: node.extension.clone(),
			address: node.address.clone(),
			prefix: node.prefix.clone(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct RouterTable {
	local: String,
	nodes: Vec<NodeRoute>,
	by_extension: HashMap<String, Placement>,
}

impl RouterTable {
	/// Build the table; node order in the configuration is the canonical order
	pub fn from_config(config: &Config) -> Self {
		Self::new(&config.coordinator.extension, config.nodes.iter().map(NodeRoute::from).collect())
	}

	pub fn new(local: &str, nodes: Vec<NodeRoute>) -> Self {
		let mut by_extension = HashMap::new();
		for (i, node) in nodes.iter().enumerate() {
			by_extension.insert(node.extension.clone(), Placement::Node(NodeId(i)));
		}
		by_extension.insert(local.to_string(), Placement::Local);
		RouterTable { local: local.to_string(), nodes, by_extension }
	}

	/// Placement for an extension; unknown and empty extensions are unsupported
	pub fn route(&self, extension: &str) -> Placement {
		if extension.is_empty() {
			return Placement::Unsupported;
		}
		self.by_extension.get(extension).copied().unwrap_or(Placement::Unsupported)
	}

	pub fn node(&self, id: NodeId) -> Option<&NodeRoute> {
		self.nodes.get(id.0)
	}

	/// Storage nodes in canonical order
	pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeRoute)> {
		self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
	}

	pub fn local_extension(&self) -> &str {
		&self.local
	}

	/// Extension classes in canonical order: local first, then nodes
	pub fn classes(&self) -> Vec<&str> {
		let mut out = vec![self.local.as_str()];
		out.extend(self.nodes.iter().map(|n| n.extension.as_str()));
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_extension_of() {
		assert_eq!(extension_of("report.pdf"), "pdf");
		assert_eq!(extension_of("archive.tar.zip"), "zip");
		assert_eq!(extension_of("Makefile"), "");
		assert_eq!(extension_of(".profile"), "");
		assert_eq!(extension_of("trailing."), "");
		assert_eq!(extension_of("dir.d/notes"), "");
		assert_eq!(extension_of("~/S1/src/main.c"), "c");
	}

	#[test]
	fn test_default_routes() {
		let table = RouterTable::from_config(&Config::default());
		assert_eq!(table.route("c"), Placement::Local);
		assert_eq!(table.route("pdf"), Placement::Node(NodeId(0)));
		assert_eq!(table.route("txt"), Placement::Node(NodeId(1)));
		assert_eq!(table.route("zip"), Placement::Node(NodeId(2)));
		assert_eq!(table.route("exe"), Placement::Unsupported);
		assert_eq!(table.route(""), Placement::Unsupported);
		assert_eq!(table.route("PDF"), Placement::Unsupported);
	}

	#[test]
	fn test_node_lookup_and_classes() {
		let table = RouterTable::from_config(&Config::default());
		let s3 = table.node(NodeId(1)).unwrap();
		assert_eq!(s3.id, "S3");
		assert_eq!(s3.prefix, "~/S3");
		assert!(table.node(NodeId(9)).is_none());
		assert_eq!(table.classes(), vec!["c", "pdf", "txt", "zip"]);
		let ids: Vec<_> = table.nodes().map(|(_, n)| n.id.as_str()).collect();
		assert_eq!(ids, vec!["S2", "S3", "S4"]);
	}
}

// vim: ts=4
