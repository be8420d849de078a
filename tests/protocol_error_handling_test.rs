//! Wire-level error handling against a live coordinator
//!
//! These tests speak the line protocol directly so they can send what a
//! well-behaved client never would.

mod common;

use std::collections::HashMap;
use tokio::net::TcpListener;

use common::{eventually, files_under, Cluster};
use routefs::error::{ErrorKind, StoreError};
use routefs::protocol::response::{self, read_listing};
use routefs::protocol::transfer::{self, FrameHeader};
use routefs::protocol::{Connection, READY};

async fn raw(cluster: &Cluster) -> Connection<tokio::net::TcpStream> {
	Connection::connect(&cluster.config.coordinator.listen, &cluster.config.network).await.unwrap()
}

#[tokio::test]
async fn test_unsupported_extension_rejected_before_any_payload() {
	let cluster = Cluster::start().await;
	let mut conn = raw(&cluster).await;

	conn.write_line("uploadf x.exe ~/S1/anypath").await.unwrap();
	let err = response::expect_ready(&mut conn).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::UnsupportedExtension);
	assert!(!cluster.root("S1").join("anypath").exists());
	assert_eq!(cluster.total_node_connections(), 0);

	// Nothing was consumed beyond the command line
	conn.write_line("dispfnames ~/S1").await.unwrap();
	assert!(read_listing(&mut conn).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_and_overlong_lines() {
	let cluster = Cluster::start().await;
	let mut conn = raw(&cluster).await;

	conn.write_line("uploadf a.c ~/S1 extra").await.unwrap();
	assert_eq!(response::expect_success(&mut conn).await.unwrap_err().kind(), ErrorKind::MalformedCommand);

	conn.write_line("frobnicate ~/S1").await.unwrap();
	assert_eq!(response::expect_success(&mut conn).await.unwrap_err().kind(), ErrorKind::MalformedCommand);

	let long = format!("dispfnames ~/S1/{}", "a".repeat(4000));
	conn.write_line(&long).await.unwrap();
	assert_eq!(response::expect_success(&mut conn).await.unwrap_err().kind(), ErrorKind::MalformedCommand);

	conn.write_line("dispfnames ~/S1").await.unwrap();
	assert!(read_listing(&mut conn).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_path_escape_rejected() {
	let cluster = Cluster::start().await;
	let mut conn = raw(&cluster).await;

	for line in ["uploadf a.c ~/S1/../../tmp", "uploadf a.c /tmp", "removef ~/S2/a.pdf"].iter() {
		conn.write_line(line).await.unwrap();
		let err = response::expect_success(&mut conn).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidPath, "{}", line);
	}

	conn.write_line("downlf ~/S1/../secret.txt").await.unwrap();
	match transfer::read_header(&mut conn).await.unwrap() {
		FrameHeader::Error { kind, .. } => assert_eq!(kind, ErrorKind::InvalidPath),
		other => panic!("expected error header, got {:?}", other),
	}
}

#[tokio::test]
async fn test_sender_aborted_upload_gets_terminal_error() {
	let cluster = Cluster::start().await;
	let mut conn = raw(&cluster).await;

	conn.write_line("uploadf a.c ~/S1/aborted").await.unwrap();
	response::expect_ready(&mut conn).await.unwrap();
	transfer::write_header(&mut conn, &FrameHeader::NotFound).await.unwrap();
	let err = response::expect_success(&mut conn).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::FileNotFound);
	assert!(files_under(&cluster.root("S1")).is_empty());
}

#[tokio::test]
async fn test_client_short_upload_leaves_no_file() {
	let cluster = Cluster::start().await;
	{
		let mut conn = raw(&cluster).await;
		conn.write_line("uploadf cut.c ~/S1/partial").await.unwrap();
		response::expect_ready(&mut conn).await.unwrap();
		transfer::write_header(&mut conn, &FrameHeader::Size(1000)).await.unwrap();
		response::expect_ready(&mut conn).await.unwrap();
		conn.write_all(&[1u8; 100]).await.unwrap();
		conn.flush().await.unwrap();
	}

	let partial = cluster.root("S1").join("partial");
	assert!(eventually(|| files_under(&partial).is_empty()).await);
	assert!(!partial.join("cut.c").exists());
}

#[tokio::test]
async fn test_listing_with_line_breaking_name_keeps_session_in_sync() {
	let cluster = Cluster::start().await;
	let root = cluster.root("S1");
	std::fs::write(root.join("x\ny.c"), b"x").unwrap();
	std::fs::write(root.join("gone.c"), b"x").unwrap();
	let mut client = cluster.client().await;

	assert_eq!(client.list("~/S1").await.unwrap(), vec!["gone.c"]);
	client.remove("~/S1/gone.c").await.unwrap();
	assert!(!root.join("gone.c").exists());
}

/// A storage node that announces more bytes than it sends
async fn lying_node() -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let address = listener.local_addr().unwrap().to_string();
	tokio::spawn(async move {
		while let Ok((stream, peer)) = listener.accept().await {
			tokio::spawn(async move {
				let mut conn = Connection::new(stream, peer.to_string());
				let _request = conn.read_line().await;
				transfer::write_header(&mut conn, &FrameHeader::Size(100)).await.unwrap();
				if conn.read_line().await.unwrap().as_deref() == Some(READY) {
					conn.write_all(&[9u8; 10]).await.unwrap();
					conn.flush().await.unwrap();
				}
			});
		}
	});
	address
}

#[tokio::test]
async fn test_relayed_short_transfer_is_detected() {
	let mut overrides = HashMap::new();
	overrides.insert("S3", lying_node().await);
	let cluster = Cluster::launch(overrides).await;
	let mut client = cluster.client().await;

	let err = client.download("~/S1/notes.txt", cluster.out.path()).await.unwrap_err();
	match err {
		StoreError::ShortTransfer { expected, received } => {
			assert_eq!(expected, 100);
			assert_eq!(received, 10);
		}
		other => panic!("expected ShortTransfer, got {:?}", other),
	}
	assert!(eventually(|| files_under(cluster.out.path()).is_empty()).await);

	// The coordinator closed this session; nothing more comes back
	assert!(client.list("~/S1").await.is_err());

	// A fresh session works
	let mut fresh = cluster.client().await;
	let err = fresh.remove("~/S1/nothing.c").await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::FileNotFound);
}

// vim: ts=4
