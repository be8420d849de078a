//! Transfer channel: size-prefixed file streaming with a ready handshake
//!
//! Every hop that carries a file (client and coordinator, coordinator and
//! storage node) uses the same frame:
//!
//! ```text
//! sender   -> "<size>\n" | "-1\n" | "ERROR: [code] msg\n"
//! receiver -> "READY\n"  | "ERROR: [code] msg\n"
//! sender   -> exactly <size> raw bytes
//! ```
//!
//! The sender never streams before the receiver has said `READY`, and the
//! receiver never reports success unless exactly `size` bytes arrived.

use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::connection::Connection;
use super::response::{self, error_line, Response, READY};
use crate::error::{ErrorKind, StoreError};

/// Size value meaning "no such file"
pub const NOT_FOUND: i64 = -1;

/// The first line of a transfer frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameHeader {
	Size(u64),
	NotFound,
	Error { kind: ErrorKind, message: String },
}

impl FrameHeader {
	pub fn error(err: &StoreError) -> Self {
		FrameHeader::Error { kind: err.kind(), message: err.to_string() }
	}

	pub fn parse(line: &str) -> Result<Self, StoreError> {
		if Response::is_error_line(line) {
			return match Response::parse(line)? {
				Response::Error { kind, message } => Ok(FrameHeader::Error { kind, message }),
				other => Err(StoreError::protocol(format!("bad error header {:?}", other))),
			};
		}
		match line.trim().parse::<i64>() {
			Ok(NOT_FOUND) => Ok(FrameHeader::NotFound),
			Ok(n) if n >= 0 => Ok(FrameHeader::Size(n as u64)),
			_ => Err(StoreError::protocol(format!("invalid size header {:?}", line))),
		}
	}

	pub fn to_wire(&self) -> String {
		match self {
			FrameHeader::Size(n) => n.to_string(),
			FrameHeader::NotFound => NOT_FOUND.to_string(),
			FrameHeader::Error { kind, message } => error_line(*kind, message),
		}
	}
}

pub async fn write_header<S>(conn: &mut Connection<S>, header: &FrameHeader) -> Result<(), StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	conn.write_line(&header.to_wire()).await
}

pub async fn read_header<S>(conn: &mut Connection<S>) -> Result<FrameHeader, StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let line = conn.read_line().await?.ok_or(StoreError::Disconnected)?;
	FrameHeader::parse(&line)
}

/// Send the file at `path` as one frame
///
/// A missing file is announced with the `-1` sentinel and reported as
/// `FileNotFound`; a file that cannot be opened is announced with an error
/// token. A receiver that answers `ERROR` instead of `READY` yields a
/// `Remote` error. In all these cases no payload was written and the
/// connection is still in sync.
pub async fn send_file<S>(
	conn: &mut Connection<S>,
	path: &Path,
	chunk_size: usize,
) -> Result<u64, StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let (mut file, size) = match open_source(path).await {
		Ok(opened) => opened,
		Err(err) => {
			let header = match err {
				StoreError::FileNotFound { .. } => FrameHeader::NotFound,
				ref other => FrameHeader::error(other),
			};
			write_header(conn, &header).await?;
			return Err(err);
		}
	};

	write_header(conn, &FrameHeader::Size(size)).await?;
	response::expect_ready(conn).await?;

	let mut buf = vec![0u8; chunk_size.max(1)];
	let mut sent: u64 = 0;
	while sent < size {
		let want = chunk_len(buf.len(), size - sent);
		let n = file.read(&mut buf[..want]).await?;
		if n == 0 {
			// File shrank after its size was announced
			return Err(StoreError::ShortTransfer { expected: size, received: sent });
		}
		conn.write_all(&buf[..n]).await?;
		sent += n as u64;
	}
	conn.flush().await?;
	debug!("sent {} ({} bytes) to {}", path.display(), sent, conn.peer());
	Ok(sent)
}

/// Receive `expected` bytes into `dest`, after the size header was read
///
/// Opens the destination, answers `READY` (or `ERROR` if it cannot be
/// created) and then reads exactly `expected` bytes. A disk error does not
/// stop the read: the rest of the payload is drained so the connection stays
/// usable, then `WriteFailure` is returned. An early EOF is `ShortTransfer`.
pub async fn receive_file<S>(
	conn: &mut Connection<S>,
	dest: &Path,
	expected: u64,
	chunk_size: usize,
) -> Result<u64, StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let mut file = match File::create(dest).await {
		Ok(f) => f,
		Err(source) => {
			let err = StoreError::WriteFailure { path: dest.display().to_string(), source };
			conn.write_line(&error_line(err.kind(), &err.to_string())).await?;
			return Err(err);
		}
	};
	conn.write_line(READY).await?;

	let mut buf = vec![0u8; chunk_size.max(1)];
	let mut received: u64 = 0;
	let mut write_error = None;
	while received < expected {
		let want = chunk_len(buf.len(), expected - received);
		let n = match conn.read_some(&mut buf[..want]).await {
			Ok(n) => n,
			Err(e) => {
				debug!("read from {} failed mid-transfer: {}", conn.peer(), e);
				0
			}
		};
		if n == 0 {
			return Err(StoreError::ShortTransfer { expected, received });
		}
		if write_error.is_none() {
			if let Err(e) = file.write_all(&buf[..n]).await {
				write_error = Some(e);
			}
		}
		received += n as u64;
	}

	if write_error.is_none() {
		if let Err(e) = file.flush().await {
			write_error = Some(e);
		}
	}
	match write_error {
		Some(source) => {
			Err(StoreError::WriteFailure { path: dest.display().to_string(), source })
		}
		None => {
			debug!("received {} ({} bytes) from {}", dest.display(), received, conn.peer());
			Ok(received)
		}
	}
}

/// Read a frame header and receive the payload into `dest`
///
/// `source` names the remote file in error messages. The destination is only
/// created once a real size arrives, so "not found" never leaves a file behind.
pub async fn receive_frame<S>(
	conn: &mut Connection<S>,
	source: &str,
	dest: &Path,
	chunk_size: usize,
) -> Result<u64, StoreError>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	match read_header(conn).await? {
		FrameHeader::Size(size) => receive_file(conn, dest, size, chunk_size).await,
		FrameHeader::NotFound => Err(StoreError::FileNotFound { path: source.to_string() }),
		FrameHeader::Error { kind, message } => Err(StoreError::Remote { kind, message }),
	}
}

/// Copy exactly `expected` payload bytes from one connection to another
///
/// Bytes are forwarded as they arrive; nothing is buffered beyond one chunk.
pub async fn relay<A, B>(
	from: &mut Connection<A>,
	to: &mut Connection<B>,
	expected: u64,
	chunk_size: usize,
) -> Result<u64, StoreError>
where
	A: AsyncRead + AsyncWrite + Unpin,
	B: AsyncRead + AsyncWrite + Unpin,
{
	let mut buf = vec![0u8; chunk_size.max(1)];
	let mut forwarded: u64 = 0;
	while forwarded < expected {
		let want = chunk_len(buf.len(), expected - forwarded);
		let n = match from.read_some(&mut buf[..want]).await {
			Ok(n) => n,
			Err(e) => {
				debug!("relay read from {} failed: {}", from.peer(), e);
				0
			}
		};
		if n == 0 {
			return Err(StoreError::ShortTransfer { expected, received: forwarded });
		}
		to.write_all(&buf[..n]).await?;
		forwarded += n as u64;
	}
	to.flush().await?;
	Ok(forwarded)
}

async fn open_source(path: &Path) -> Result<(File, u64), StoreError> {
	let not_found = || StoreError::FileNotFound { path: path.display().to_string() };
	let file = match File::open(path).await {
		Ok(f) => f,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
		Err(source) => {
			return Err(StoreError::ReadFailure { path: path.display().to_string(), source })
		}
	};
	let meta = file.metadata().await.map_err(|source| StoreError::ReadFailure {
		path: path.display().to_string(),
		source,
	})?;
	if !meta.is_file() {
		return Err(not_found());
	}
	Ok((file, meta.len()))
}

fn chunk_len(buf_len: usize, remaining: u64) -> usize {
	if remaining < buf_len as u64 {
		remaining as usize
	} else {
		buf_len
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_header_parse() {
		assert_eq!(FrameHeader::parse("0").unwrap(), FrameHeader::Size(0));
		assert_eq!(FrameHeader::parse("1048576").unwrap(), FrameHeader::Size(1048576));
		assert_eq!(FrameHeader::parse("-1").unwrap(), FrameHeader::NotFound);
		assert!(FrameHeader::parse("-2").is_err());
		assert!(FrameHeader::parse("ten").is_err());
		assert_eq!(
			FrameHeader::parse("ERROR: [node-unreachable] down").unwrap(),
			FrameHeader::Error { kind: ErrorKind::NodeUnreachable, message: "down".into() }
		);
	}

	#[tokio::test]
	async fn test_send_and_receive_file() {
		let dir = TempDir::new().unwrap();
		let src = dir.path().join("src.bin");
		let dst = dir.path().join("dst.bin");
		let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
		std::fs::write(&src, &content).unwrap();

		let (a, b) = tokio::io::duplex(512);
		let mut sender = Connection::new(a, "sender");
		let mut receiver = Connection::new(b, "receiver");

		let src_clone = src.clone();
		let send = tokio::spawn(async move { send_file(&mut sender, &src_clone, 700).await });
		let got = receive_frame(&mut receiver, "src.bin", &dst, 300).await.unwrap();
		let sent = send.await.unwrap().unwrap();

		assert_eq!(sent, content.len() as u64);
		assert_eq!(got, content.len() as u64);
		assert_eq!(std::fs::read(&dst).unwrap(), content);
	}

	#[tokio::test]
	async fn test_zero_byte_file_is_success() {
		let dir = TempDir::new().unwrap();
		let src = dir.path().join("empty.txt");
		let dst = dir.path().join("copy.txt");
		std::fs::write(&src, b"").unwrap();

		let (a, b) = tokio::io::duplex(64);
		let mut sender = Connection::new(a, "sender");
		let mut receiver = Connection::new(b, "receiver");

		let src_clone = src.clone();
		let send = tokio::spawn(async move { send_file(&mut sender, &src_clone, 64).await });
		assert_eq!(receive_frame(&mut receiver, "empty.txt", &dst, 64).await.unwrap(), 0);
		assert_eq!(send.await.unwrap().unwrap(), 0);
		assert!(dst.is_file());
		assert_eq!(std::fs::metadata(&dst).unwrap().len(), 0);
	}

	#[tokio::test]
	async fn test_missing_source_sends_sentinel() {
		let dir = TempDir::new().unwrap();
		let dst = dir.path().join("never.txt");

		let (a, b) = tokio::io::duplex(64);
		let mut sender = Connection::new(a, "sender");
		let mut receiver = Connection::new(b, "receiver");

		let missing = dir.path().join("missing.txt");
		let err = send_file(&mut sender, &missing, 64).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::FileNotFound);

		let err = receive_frame(&mut receiver, "missing.txt", &dst, 64).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::FileNotFound);
		assert!(!dst.exists());
	}

	#[tokio::test]
	async fn test_short_transfer_detected() {
		let dir = TempDir::new().unwrap();
		let dst = dir.path().join("partial.bin");

		let (a, b) = tokio::io::duplex(1024);
		let mut sender = Connection::new(a, "sender");
		let mut receiver = Connection::new(b, "receiver");

		let fake_sender = tokio::spawn(async move {
			write_header(&mut sender, &FrameHeader::Size(100)).await.unwrap();
			let line = sender.read_line().await.unwrap();
			assert_eq!(line.as_deref(), Some(READY));
			sender.write_all(&[7u8; 40]).await.unwrap();
			sender.flush().await.unwrap();
			// connection dropped here, 60 bytes short
		});

		let err = receive_frame(&mut receiver, "partial.bin", &dst, 16).await.unwrap_err();
		fake_sender.await.unwrap();
		match err {
			StoreError::ShortTransfer { expected, received } => {
				assert_eq!(expected, 100);
				assert_eq!(received, 40);
			}
			other => panic!("expected ShortTransfer, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_receiver_refusal_reaches_sender() {
		let dir = TempDir::new().unwrap();
		let src = dir.path().join("a.txt");
		std::fs::write(&src, b"payload").unwrap();
		let bad_dest = dir.path().join("no-such-dir").join("a.txt");

		let (a, b) = tokio::io::duplex(256);
		let mut sender = Connection::new(a, "sender");
		let mut receiver = Connection::new(b, "receiver");

		let src_clone = src.clone();
		let send = tokio::spawn(async move { send_file(&mut sender, &src_clone, 64).await });
		let err = receive_frame(&mut receiver, "a.txt", &bad_dest, 64).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::WriteFailure);

		let send_err = send.await.unwrap().unwrap_err();
		assert_eq!(send_err.kind(), ErrorKind::WriteFailure);
		assert!(!send_err.breaks_connection());
	}

	#[tokio::test]
	async fn test_relay_passes_bytes_through() {
		let (up_a, up_b) = tokio::io::duplex(128);
		let (down_a, down_b) = tokio::io::duplex(128);
		let mut upstream_writer = Connection::new(up_a, "node");
		let mut upstream = Connection::new(up_b, "node");
		let mut downstream = Connection::new(down_a, "client");
		let mut client = Connection::new(down_b, "client");

		let payload: Vec<u8> = (0..1000u32).map(|i| (i % 13) as u8).collect();
		let expected = payload.clone();
		let writer = tokio::spawn(async move {
			upstream_writer.write_all(&payload).await.unwrap();
			upstream_writer.flush().await.unwrap();
		});
		let reader = tokio::spawn(async move {
			let mut got = Vec::new();
			let mut buf = [0u8; 64];
			while got.len() < 1000 {
				let n = client.read_some(&mut buf).await.unwrap();
				assert!(n > 0);
				got.extend_from_slice(&buf[..n]);
			}
			got
		});

		let n = relay(&mut upstream, &mut downstream, 1000, 100).await.unwrap();
		writer.await.unwrap();
		assert_eq!(n, 1000);
		assert_eq!(reader.await.unwrap(), expected);
	}
}

// vim: ts=4
