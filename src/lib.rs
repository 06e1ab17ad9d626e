//! Workspace facade crate.
//!
//! Re-exports the client core so host applications can depend on
//! `foodsafe-core` alone and pick bridge shims through features.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
