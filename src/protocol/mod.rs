//! Wire protocol
//!
//! Control traffic is line based: a command or request line, then `READY`,
//! `SUCCESS: ...` or `ERROR: [code] ...` lines. Files travel in transfer
//! frames (see [`transfer`]). The same primitives serve every hop.
//!
//! # Example Usage
//!
//! ```ignore
//! use routefs::protocol::{Connection, NodeRequest, transfer};
//!
//! let mut conn = Connection::connect("127.0.0.1:8081", &config.network).await?;
//! conn.write_line(&NodeRequest::Fetch { path: "~/S2/docs/a.pdf".into() }.to_string()).await?;
//! transfer::receive_frame(&mut conn, "a.pdf", &dest, 65536).await?;
//! ```

pub mod command;
pub mod connection;
pub mod response;
pub mod transfer;

// Re-export public API
pub use command::{Command, NodeRequest};
pub use connection::Connection;
pub use response::{Response, READY};
pub use transfer::FrameHeader;

// vim: ts=4
