//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides implementations of all bridge traits using
//! desktop-appropriate libraries:
//! - `HttpClient` using `reqwest`
//! - `KeyValueStore` using an SQLite table via `sqlx`
//! - `ConnectivitySource` using a TCP reachability probe
//! - `CapabilityDescriptor` backed by the data directory and key-value store
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteKeyValueStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let store = SqliteKeyValueStore::new("data/kv.db".into()).await?;
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod capabilities;
mod http;
mod kv_store;
mod network;

pub use capabilities::DesktopCapabilities;
pub use http::ReqwestHttpClient;
pub use kv_store::{SqliteKeyValueStore, DEFAULT_LIMIT_KB};
pub use network::DesktopConnectivitySource;
