//! Error types for RouteFS operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::validation::ValidationError;

/// Wire-level classification of an error
///
/// Every error that crosses a connection is reduced to one of these kinds and
/// transmitted as `ERROR: [<code>] <message>`, so a peer can rebuild a typed
/// error from the text it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	InvalidPath,
	UnsupportedExtension,
	DirectoryNotFound,
	FileNotFound,
	NodeUnreachable,
	ShortTransfer,
	WriteFailure,
	MalformedCommand,
	Internal,
}

impl ErrorKind {
	/// Code used on the wire
	pub fn code(self) -> &'static str {
		match self {
			ErrorKind::InvalidPath => "invalid-path",
			ErrorKind::UnsupportedExtension => "unsupported-extension",
			ErrorKind::DirectoryNotFound => "directory-not-found",
			ErrorKind::FileNotFound => "file-not-found",
			ErrorKind::NodeUnreachable => "node-unreachable",
			ErrorKind::ShortTransfer => "short-transfer",
			ErrorKind::WriteFailure => "write-failure",
			ErrorKind::MalformedCommand => "malformed-command",
			ErrorKind::Internal => "internal",
		}
	}

	/// Parse a wire code; unknown codes collapse to `Internal`
	pub fn from_code(code: &str) -> Self {
		match code {
			"invalid-path" => ErrorKind::InvalidPath,
			"unsupported-extension" => ErrorKind::UnsupportedExtension,
			"directory-not-found" => ErrorKind::DirectoryNotFound,
			"file-not-found" => ErrorKind::FileNotFound,
			"node-unreachable" => ErrorKind::NodeUnreachable,
			"short-transfer" => ErrorKind::ShortTransfer,
			"write-failure" => ErrorKind::WriteFailure,
			"malformed-command" => ErrorKind::MalformedCommand,
			_ => ErrorKind::Internal,
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.code())
	}
}

/// Main error type for store operations
#[derive(Debug)]
pub enum StoreError {
	/// Path escapes the managed root or is otherwise unusable
	InvalidPath { path: String, reason: String },

	/// No placement exists for this extension
	UnsupportedExtension { extension: String },

	/// Directory to list does not exist
	DirectoryNotFound { path: String },

	/// File to fetch or delete does not exist
	FileNotFound { path: String },

	/// A storage node could not be reached or dropped the link
	NodeUnreachable { node: String, reason: String },

	/// Peer closed the connection before the declared size arrived
	ShortTransfer { expected: u64, received: u64 },

	/// Local disk error while storing data
	WriteFailure { path: String, source: io::Error },

	/// Local file exists but cannot be opened or read
	ReadFailure { path: String, source: io::Error },

	/// Command line could not be tokenized into a command
	MalformedCommand { message: String },

	/// Error reported by the peer on the other end of a connection
	Remote { kind: ErrorKind, message: String },

	/// Peer sent something the protocol does not allow at this point
	Protocol { message: String },

	/// Connection closed while a response was still expected
	Disconnected,

	/// Invalid configuration
	InvalidConfig { message: String },

	/// I/O error
	Io(io::Error),
}

impl StoreError {
	/// Wire classification of this error
	pub fn kind(&self) -> ErrorKind {
		match self {
			StoreError::InvalidPath { .. } => ErrorKind::InvalidPath,
			StoreError::UnsupportedExtension { .. } => ErrorKind::UnsupportedExtension,
			StoreError::DirectoryNotFound { .. } => ErrorKind::DirectoryNotFound,
			StoreError::FileNotFound { .. } => ErrorKind::FileNotFound,
			StoreError::NodeUnreachable { .. } => ErrorKind::NodeUnreachable,
			StoreError::ShortTransfer { .. } => ErrorKind::ShortTransfer,
			StoreError::WriteFailure { .. } => ErrorKind::WriteFailure,
			StoreError::MalformedCommand { .. } => ErrorKind::MalformedCommand,
			StoreError::Remote { kind, .. } => *kind,
			StoreError::ReadFailure { .. }
			| StoreError::Protocol { .. }
			| StoreError::Disconnected
			| StoreError::InvalidConfig { .. }
			| StoreError::Io(_) => ErrorKind::Internal,
		}
	}

	/// True when the connection this error happened on can no longer be trusted
	///
	/// Byte streams that stopped mid-frame leave unread payload (or missing
	/// payload) on the wire, so the next command would be misparsed.
	pub fn breaks_connection(&self) -> bool {
		matches!(
			self,
			StoreError::ShortTransfer { .. }
				| StoreError::Protocol { .. }
				| StoreError::Disconnected
				| StoreError::Io(_)
		)
	}

	pub fn malformed(message: impl Into<String>) -> Self {
		StoreError::MalformedCommand { message: message.into() }
	}

	pub fn protocol(message: impl Into<String>) -> Self {
		StoreError::Protocol { message: message.into() }
	}
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::InvalidPath { path, reason } => {
				write!(f, "Invalid path {}: {}", path, reason)
			}
			StoreError::UnsupportedExtension { extension } => {
				if extension.is_empty() {
					write!(f, "Unsupported file extension: (none)")
				} else {
					write!(f, "Unsupported file extension: {}", extension)
				}
			}
			StoreError::DirectoryNotFound { path } => write!(f, "Directory {} not found", path),
			StoreError::FileNotFound { path } => write!(f, "File {} not found", path),
			StoreError::NodeUnreachable { node, reason } => {
				write!(f, "Storage node {} unreachable: {}", node, reason)
			}
			StoreError::ShortTransfer { expected, received } => {
				write!(f, "Short transfer: expected {} bytes, received {}", expected, received)
			}
			StoreError::WriteFailure { path, source } => {
				write!(f, "Cannot write {}: {}", path, source)
			}
			StoreError::ReadFailure { path, source } => {
				write!(f, "Cannot read {}: {}", path, source)
			}
			StoreError::MalformedCommand { message } => {
				write!(f, "Invalid command syntax: {}", message)
			}
			StoreError::Remote { message, .. } => write!(f, "{}", message),
			StoreError::Protocol { message } => write!(f, "Protocol violation: {}", message),
			StoreError::Disconnected => write!(f, "Connection closed by peer"),
			StoreError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			StoreError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for StoreError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			StoreError::WriteFailure { source, .. } => Some(source),
			StoreError::ReadFailure { source, .. } => Some(source),
			StoreError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for StoreError {
	fn from(e: io::Error) -> Self {
		StoreError::Io(e)
	}
}

impl From<ValidationError> for StoreError {
	fn from(e: ValidationError) -> Self {
		match e {
			ValidationError::PathError { path, reason } => StoreError::InvalidPath { path, reason },
			ValidationError::ConfigError(message) => StoreError::InvalidConfig { message },
		}
	}
}


// vim: ts=4
