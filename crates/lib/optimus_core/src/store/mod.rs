//! Persistence seams for identities and password reset records.
//!
//! The auth core only talks to these traits. `PgStore` backs production,
//! `MemoryStore` backs tests and database-less dev runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{Identity, NewIdentity, PasswordResetRecord, ProfileUpdate, UserId};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint on `email` rejected the insert.
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// User-record store. Emails passed in are already normalized.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, StoreError>;

    /// Insert a new identity. Fails with [`StoreError::DuplicateEmail`] when
    /// the email is taken, including when a concurrent insert won the race.
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError>;

    /// Replace the credential hash and bump `password_changed_at`.
    /// Returns `false` if the user does not exist.
    async fn update_password_hash(
        &self,
        id: UserId,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<Option<Identity>, StoreError>;
}

/// Password reset record store.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn insert_reset(&self, record: PasswordResetRecord) -> Result<(), StoreError>;

    async fn find_reset(
        &self,
        user_id: UserId,
        token_hash: &str,
    ) -> Result<Option<PasswordResetRecord>, StoreError>;

    /// Remove every record for the user. Returns the number removed.
    async fn delete_resets_for(&self, user_id: UserId) -> Result<u64, StoreError>;

    /// Remove every record that expired before `now`.
    async fn delete_expired_resets(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
