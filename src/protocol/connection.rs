//! Line-oriented connection over any reliable byte stream
//!
//! Control messages are `\n`-terminated lines with a hard length limit; file
//! payloads are raw bytes read through the same buffered reader, so bytes that
//! arrive in the same segment as a control line are never lost.

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{
	AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;

use crate::config::{NetworkConfig, DEFAULT_MAX_LINE_LENGTH};
use crate::error::StoreError;

/// A buffered, bidirectional protocol connection
pub struct Connection<S> {
	stream: BufReader<S>,
	peer: String,
	max_line: usize,
	io_timeout: Option<Duration>,
}

impl<S> Connection<S>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	pub fn new(stream: S, peer: impl Into<String>) -> Self {
		Self {
			stream: BufReader::new(stream),
			peer: peer.into(),
			max_line: DEFAULT_MAX_LINE_LENGTH,
			io_timeout: None,
		}
	}

	pub fn with_max_line(mut self, max_line: usize) -> Self {
		self.max_line = max_line;
		self
	}

	pub fn with_io_timeout(mut self, io_timeout: Option<Duration>) -> Self {
		self.io_timeout = io_timeout;
		self
	}

	/// Human-readable name of the remote end, for logs
	pub fn peer(&self) -> &str {
		&self.peer
	}

	/// Read one line, without its terminator
	///
	/// Returns `None` on a clean EOF before any byte of a new line. A line
	/// longer than the limit is consumed up to its terminator and rejected as
	/// `MalformedCommand`, leaving the connection positioned at the next line.
	pub async fn read_line(&mut self) -> Result<Option<String>, StoreError> {
		let mut buf = Vec::new();
		let limit = self.max_line as u64 + 1;
		let n = {
			let stream = &mut self.stream;
			let buf = &mut buf;
			timed(self.io_timeout, async move {
				let mut limited = stream.take(limit);
				limited.read_until(b'\n', buf).await
			})
			.await?
		};
		if n == 0 {
			return Ok(None);
		}

		if buf.last() == Some(&b'\n') {
			buf.pop();
			if buf.last() == Some(&b'\r') {
				buf.pop();
			}
		} else if buf.len() as u64 == limit {
			self.discard_line().await?;
			return Err(StoreError::malformed(format!(
				"line exceeds {} bytes",
				self.max_line
			)));
		}

		String::from_utf8(buf)
			.map(Some)
			.map_err(|_| StoreError::malformed("line is not valid UTF-8"))
	}

	/// Write one line and flush it
	pub async fn write_line(&mut self, line: &str) -> Result<(), StoreError> {
		let mut data = Vec::with_capacity(line.len() + 1);
		data.extend_from_slice(line.as_bytes());
		data.push(b'\n');
		self.write_all(&data).await?;
		self.flush().await
	}

	/// Read whatever payload bytes are available, up to `buf.len()`
	pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, StoreError> {
		let stream = &mut self.stream;
		timed(self.io_timeout, stream.read(buf)).await
	}

	pub async fn write_all(&mut self, data: &[u8]) -> Result<(), StoreError> {
		let stream = self.stream.get_mut();
		timed(self.io_timeout, stream.write_all(data)).await
	}

	pub async fn flush(&mut self) -> Result<(), StoreError> {
		let stream = self.stream.get_mut();
		timed(self.io_timeout, stream.flush()).await
	}

	/// Half-close the write side
	pub async fn shutdown(&mut self) -> Result<(), StoreError> {
		let stream = self.stream.get_mut();
		timed(self.io_timeout, stream.shutdown()).await
	}

	async fn discard_line(&mut self) -> Result<(), StoreError> {
		loop {
			let (consumed, done) = {
				let stream = &mut self.stream;
				let available = timed(self.io_timeout, stream.fill_buf()).await?;
				if available.is_empty() {
					(0, true)
				} else {
					match available.iter().position(|b| *b == b'\n') {
						Some(pos) => (pos + 1, true),
						None => (available.len(), false),
					}
				}
			};
			self.stream.consume(consumed);
			if done {
				return Ok(());
			}
		}
	}
}

impl Connection<TcpStream> {
	/// Open a connection to `address`, honoring the link timeouts in `network`
	pub async fn connect(address: &str, network: &NetworkConfig) -> Result<Self, StoreError> {
		let connect = TcpStream::connect(address);
		let stream = match network.connect_timeout() {
			Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
				StoreError::Io(io::Error::new(
					io::ErrorKind::TimedOut,
					format!("connect to {} timed out", address),
				))
			})??,
			None => connect.await?,
		};
		stream.set_nodelay(true)?;
		Ok(Connection::new(stream, address).with_io_timeout(network.io_timeout()))
	}
}

async fn timed<T, F>(limit: Option<Duration>, fut: F) -> Result<T, StoreError>
where
	F: Future<Output = io::Result<T>>,
{
	match limit {
		Some(limit) => match tokio::time::timeout(limit, fut).await {
			Ok(result) => Ok(result?),
			Err(_) => Err(StoreError::Io(io::Error::new(
				io::ErrorKind::TimedOut,
				format!("no progress within {:?}", limit),
			))),
		},
		None => Ok(fut.await?),
	}
}


// vim: ts=4
