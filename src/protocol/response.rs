//! Terminal responses and handshake tokens

use tokio::io::{AsyncRead, AsyncWrite};

use super::connection::Connection;
use crate::error::{ErrorKind, StoreError};

/// Handshake token: command accepted, or receiver ready for payload
pub const READY: &str = "READY";

const SUCCESS_PREFIX: &str = "SUCCESS: ";
const ERROR_PREFIX: &str = "ERROR: ";

/// A response line (or, for listings, a response block)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
	Ready,
	Success(String),
	Error { kind: ErrorKind, message: String },
	Listing(Vec<String>),
}

impl Response {
	pub fn success(message: impl Into<String>) -> Self {
		Response::Success(message.into())
	}

	pub fn error(err: &StoreError) -> Self {
		Response::Error { kind: err.kind(), message: err.to_string() }
	}

	/// Parse a single status line
	///
	/// A listing header parses as `Success`; use [`read_listing`] when a
	/// listing is expected.
	pub fn parse(line: &str) -> Result<Self, StoreError> {
		if line == READY {
			return Ok(Response::Ready);
		}
		if let Some(message) = line.strip_prefix(SUCCESS_PREFIX) {
			return Ok(Response::Success(message.to_string()));
		}
		if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
			let (kind, message) = split_error(rest);
			return Ok(Response::Error { kind, message });
		}
		match line {
			"SUCCESS:" => return Ok(Response::Success(String::new())),
			"ERROR:" => {
				return Ok(Response::Error { kind: ErrorKind::Internal, message: String::new() })
			}
			_ => {}
		}
		Err(StoreError::protocol(format!("unexpected response line {:?}", line)))
	}

	/// Whether a line is an error token rather than data
	pub fn is_error_line(line: &str) -> bool {
		line.starts_with("ERROR:")
	}

	/// Convert into a result, turning `Error` into a typed remote error
	pub fn into_result(self) -> Result<Response, StoreError> {
		match self {
			Response::Error { kind, message } => Err(StoreError::Remote { kind, message }),
			other => Ok(other),
		}
	}

	/// Wire form; listings include their name lines
	pub fn to_wire(&self) -> String {
		match self {
			Response::Ready => READY.to_string(),
			Response::Success(message) => format!("{}{}", SUCCESS_PREFIX, message),
			Response::Error { kind, message } => error_line(*kind, message),
			Response::Listing(names) => {
				let mut out = format!("{}{} file(s)", SUCCESS_PREFIX, names.len());
				for name in names {
					out.push('\n');
					out.push_str(name);
				}
				out
			}
		}
	}
}

/// Format `ERROR: [code] message`
pub fn error_line(kind: ErrorKind, message: &str) -> String {
	format!("{}[{}] {}", ERROR_PREFIX, kind.code(), message)
}

fn split_error(rest: &str) -> (ErrorKind, String) {
	if let Some(body) = rest.strip_prefix('[') {
		if let Some(end) = body.find(']') {
			let kind = ErrorKind::from_code(&body[..end]);
			let message = body[end + 1..].trim_start().to_string();
			return (kind, message);
		}
	}
	(ErrorKind::Internal, rest.to_string())
}

/// Write a response and flush
pub async fn write_response<S>(conn: &mut Connection<S>, response: &Response) -> Result<(), StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	conn.write_line(&response.to_wire()).await
}

/// Read one status line; EOF is `Disconnected`
pub async fn read_response<S>(conn: &mut Connection<S>) -> Result<Response, StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let line = conn.read_line().await?.ok_or(StoreError::Disconnected)?;
	Response::parse(&line)
}

/// Read a terminal response that must be `SUCCESS`, returning its message
pub async fn expect_success<S>(conn: &mut Connection<S>) -> Result<String, StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	match read_response(conn).await?.into_result()? {
		Response::Success(message) => Ok(message),
		other => Err(StoreError::protocol(format!("expected SUCCESS, got {:?}", other))),
	}
}

/// Read a `READY` acknowledgement; an `ERROR` line becomes a remote error
pub async fn expect_ready<S>(conn: &mut Connection<S>) -> Result<(), StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	match read_response(conn).await?.into_result()? {
		Response::Ready => Ok(()),
		other => Err(StoreError::protocol(format!("expected READY, got {:?}", other))),
	}
}

/// Largest listing a peer may announce
pub const MAX_LISTING_ENTRIES: usize = 1_000_000;

/// Read a listing block: `SUCCESS: <n> file(s)` followed by `n` names
pub async fn read_listing<S>(conn: &mut Connection<S>) -> Result<Vec<String>, StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let header = match read_response(conn).await?.into_result()? {
		Response::Success(message) => message,
		other => return Err(StoreError::protocol(format!("expected listing, got {:?}", other))),
	};
	let count: usize = header
		.split_whitespace()
		.next()
		.and_then(|n| n.parse().ok())
		.ok_or_else(|| StoreError::protocol(format!("bad listing header {:?}", header)))?;

	if count > MAX_LISTING_ENTRIES {
		return Err(StoreError::protocol(format!("listing of {} entries exceeds limit", count)));
	}

	let mut names = Vec::with_capacity(count.min(1024));
	for _ in 0..count {
		let name = conn.read_line().await?.ok_or(StoreError::Disconnected)?;
		names.push(name);
	}
	Ok(names)
}


// vim: ts=4
