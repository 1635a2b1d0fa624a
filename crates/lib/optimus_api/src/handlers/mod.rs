//! Request handlers.

pub mod auth;
pub mod companies;
pub mod health;
pub mod oauth;
pub mod users;
