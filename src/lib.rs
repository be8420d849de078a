//! # RouteFS - Extension-Routed Distributed File Store
//!
//! A coordinator accepts client commands and places every file on the node
//! that owns its extension: one class stays on the coordinator, each other
//! class lives on exactly one storage node. Files move between hops in
//! size-prefixed transfer frames with a ready handshake.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use routefs::{client::Client, config::Config};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let mut client = Client::connect(&config).await?;
//!     client.upload(Path::new("notes.txt"), "~/S1/notes").await?;
//!     for name in client.list("~/S1/notes").await? {
//!         println!("{}", name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Running the servers
//!
//! ```rust,ignore
//! use routefs::{config::Config, coordinator::Coordinator, serve, utils::shutdown_signal};
//! use std::sync::Arc;
//!
//! let config = Config::load(None)?;
//! let coordinator = Coordinator::new(&config);
//! coordinator.prepare().await?;
//! let listener = serve::bind(&config.coordinator.listen).await?;
//! serve::serve(listener, Arc::new(coordinator), shutdown_signal()).await?;
//! ```

pub mod archive;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod listing;
pub mod logging;
pub mod node;
pub mod paths;
pub mod protocol;
pub mod router;
pub mod serve;
pub mod util;
pub mod utils;
pub mod validation;

// Re-export commonly used types and functions
pub use config::Config;
pub use error::{ErrorKind, StoreError};
pub use router::{Placement, RouterTable};

// vim: ts=4
