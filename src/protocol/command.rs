//! Command tokenizer
//!
//! Client commands and node requests are single lines of whitespace-separated
//! tokens. Parsing produces a typed value or rejects the line; nothing is
//! truncated or guessed.

use std::fmt;

use crate::error::StoreError;

/// Maximum number of tokens on a command line (verb included)
pub const MAX_TOKENS: usize = 3;

/// A client command, as sent to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	/// Store `name` under the directory `dest`
	Upload { name: String, dest: String },
	/// Fetch the file at `path`
	Download { path: String },
	/// Delete the file at `path`
	Remove { path: String },
	/// Fetch a bundle of every file of one extension class
	Archive { extension: String },
	/// List the files directly inside `path`
	ListNames { path: String },
}

impl Command {
	pub const UPLOAD: &'static str = "uploadf";
	pub const DOWNLOAD: &'static str = "downlf";
	pub const REMOVE: &'static str = "removef";
	pub const ARCHIVE: &'static str = "downltar";
	pub const LIST: &'static str = "dispfnames";

	/// Parse one command line
	pub fn parse(line: &str) -> Result<Self, StoreError> {
		let tokens = tokenize(line)?;
		let verb = tokens[0];
		let args = &tokens[1..];

		let command = match verb {
			Self::UPLOAD => {
				expect_args(verb, args, 2, "uploadf filename destination_path")?;
				Command::Upload { name: args[0].to_string(), dest: args[1].to_string() }
			}
			Self::DOWNLOAD => {
				expect_args(verb, args, 1, "downlf filename")?;
				Command::Download { path: args[0].to_string() }
			}
			Self::REMOVE => {
				expect_args(verb, args, 1, "removef filename")?;
				Command::Remove { path: args[0].to_string() }
			}
			Self::ARCHIVE => {
				expect_args(verb, args, 1, "downltar filetype")?;
				let extension = args[0];
				if extension.starts_with('.') {
					return Err(StoreError::malformed(format!(
						"file type must be a bare extension without a leading dot, got {}",
						extension
					)));
				}
				Command::Archive { extension: extension.to_string() }
			}
			Self::LIST => {
				expect_args(verb, args, 1, "dispfnames pathname")?;
				Command::ListNames { path: args[0].to_string() }
			}
			other => return Err(StoreError::malformed(format!("unknown command {}", other))),
		};
		Ok(command)
	}

	pub fn verb(&self) -> &'static str {
		match self {
			Command::Upload { .. } => Self::UPLOAD,
			Command::Download { .. } => Self::DOWNLOAD,
			Command::Remove { .. } => Self::REMOVE,
			Command::Archive { .. } => Self::ARCHIVE,
			Command::ListNames { .. } => Self::LIST,
		}
	}

	/// Usage lines for every command, for help output
	pub fn usage() -> &'static [&'static str] {
		&[
			"uploadf filename destination_path",
			"downlf filename",
			"removef filename",
			"downltar filetype",
			"dispfnames pathname",
		]
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.verb())?;
		match self {
			Command::Upload { name, dest } => write!(f, " {} {}", name, dest),
			Command::Download { path } | Command::Remove { path } | Command::ListNames { path } => {
				write!(f, " {}", path)
			}
			Command::Archive { extension } => write!(f, " {}", extension),
		}
	}
}

/// A request from the coordinator to a storage node
///
/// Paths are already rewritten into the node's own prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRequest {
	Store { path: String },
	Fetch { path: String },
	Delete { path: String },
	Archive,
	List { path: String },
}

impl NodeRequest {
	pub fn parse(line: &str) -> Result<Self, StoreError> {
		let tokens = tokenize(line)?;
		let verb = tokens[0];
		let args = &tokens[1..];

		let request = match verb {
			"STORE" => {
				expect_args(verb, args, 1, "STORE path")?;
				NodeRequest::Store { path: args[0].to_string() }
			}
			"FETCH" => {
				expect_args(verb, args, 1, "FETCH path")?;
				NodeRequest::Fetch { path: args[0].to_string() }
			}
			"DELETE" => {
				expect_args(verb, args, 1, "DELETE path")?;
				NodeRequest::Delete { path: args[0].to_string() }
			}
			"ARCHIVE" => {
				expect_args(verb, args, 0, "ARCHIVE")?;
				NodeRequest::Archive
			}
			"LIST" => {
				expect_args(verb, args, 1, "LIST path")?;
				NodeRequest::List { path: args[0].to_string() }
			}
			other => return Err(StoreError::malformed(format!("unknown request {}", other))),
		};
		Ok(request)
	}
}

impl fmt::Display for NodeRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NodeRequest::Store { path } => write!(f, "STORE {}", path),
			NodeRequest::Fetch { path } => write!(f, "FETCH {}", path),
			NodeRequest::Delete { path } => write!(f, "DELETE {}", path),
			NodeRequest::Archive => write!(f, "ARCHIVE"),
			NodeRequest::List { path } => write!(f, "LIST {}", path),
		}
	}
}

fn tokenize(line: &str) -> Result<Vec<&str>, StoreError> {
	let tokens: Vec<&str> = line.split_whitespace().collect();
	if tokens.is_empty() {
		return Err(StoreError::malformed("empty command"));
	}
	if tokens.len() > MAX_TOKENS {
		return Err(StoreError::malformed(format!(
			"too many arguments ({} tokens, at most {})",
			tokens.len(),
			MAX_TOKENS
		)));
	}
	Ok(tokens)
}

fn expect_args(verb: &str, args: &[&str], count: usize, usage: &str) -> Result<(), StoreError> {
	if args.len() != count {
		return Err(StoreError::malformed(format!(
			"{} takes {} argument(s), got {}. Usage: {}",
			verb,
			count,
			args.len(),
			usage
		)));
	}
	Ok(())
}


// vim: ts=4
