//! # optimus_core
//!
//! Authentication and tenant authorization core for Optimus: token
//! issuance and rotation, password reset ledger, OAuth identity resolution
//! and tenant scoping, over pluggable stores.

pub mod auth;
pub mod mail;
pub mod migrate;
pub mod models;
pub mod oauth;
pub mod store;
pub mod tenant;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
