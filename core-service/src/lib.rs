//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, durable
//! key-value storage, connectivity signal, capability descriptor) into the
//! cache and offline-queue core. Desktop apps typically enable the
//! `desktop-shims` feature, which fills missing bridges with the
//! `bridge-desktop` adapters; mini-program hosts inject their own.
//!
//! ```no_run
//! # async fn example() -> core_service::Result<()> {
//! use core_runtime::config::CoreConfig;
//! use core_service::ClientCore;
//! use bridge_traits::http::HttpRequest;
//! use std::time::Duration;
//!
//! let core = ClientCore::new(CoreConfig::builder().build()?).await?;
//! core.start();
//!
//! let tips: Vec<String> = core
//!     .fetch_cached(
//!         HttpRequest::get("https://api.example.com/tips"),
//!         Some(Duration::from_secs(300)),
//!     )
//!     .await?;
//! # let _ = tips;
//! core.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{cache_key, ClientCore, ClientOptions};
pub use error::{CoreError, Result};
