//! Authentication and authorization logic.
//!
//! Provides token issuance and verification, the bounded password hashing
//! pool and the password reset ledger, shared by `optimus_api`.

pub mod jwt;
pub mod password;
pub mod reset;

use thiserror::Error;

use crate::store::StoreError;

pub use jwt::{TokenConfig, TokenService};
pub use password::PasswordHasher;
pub use reset::{PasswordResetLedger, ResetConfig};

/// Authentication errors.
///
/// Variants that sit on enumeration-sensitive paths deliberately merge
/// several underlying causes into one message.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, malformed, forged or expired token.
    #[error("Unauthorized")]
    Unauthenticated,

    /// Unknown email or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Reset token not found, expired, already used or for another user.
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("CompanyId required")]
    TenantRequired,

    #[error("Forbidden")]
    Forbidden,

    #[error("Email already in use")]
    DuplicateEmail,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            other => AuthError::Store(other),
        }
    }
}
