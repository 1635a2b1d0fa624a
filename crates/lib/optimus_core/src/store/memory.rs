//! In-memory stores for tests and database-less dev runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::{CredentialStore, ResetTokenStore, StoreError};
use crate::models::auth::{Identity, NewIdentity, PasswordResetRecord, ProfileUpdate, UserId};

/// Concurrent in-memory store. The `emails` index plays the role of the
/// unique constraint: claiming an entry is atomic per key.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, Identity>,
    emails: DashMap<String, UserId>,
    resets: DashMap<Uuid, PasswordResetRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Snapshot of the reset records held for a user.
    pub fn resets_for(&self, user_id: UserId) -> Vec<PasswordResetRecord> {
        self.resets
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let Some(id) = self.emails.get(email).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        match self.emails.entry(new.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let identity = Identity {
                    id: UserId::new(),
                    email: new.email,
                    first_name: new.first_name,
                    last_name: new.last_name,
                    password_hash: new.password_hash,
                    role: new.role,
                    tenant_id: new.tenant_id,
                    profile: None,
                    last_login_at: None,
                    password_changed_at: now,
                    created_at: now,
                };
                self.users.insert(identity.id, identity.clone());
                slot.insert(identity.id);
                Ok(identity)
            }
        }
    }

    async fn update_password_hash(
        &self,
        id: UserId,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.users.get_mut(&id) {
            Some(mut user) => {
                user.password_hash = password_hash.to_string();
                user.password_changed_at = changed_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<Option<Identity>, StoreError> {
        let Some(mut user) = self.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(first_name) = update.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = Some(last_name);
        }
        if let Some(profile) = update.profile {
            user.profile = Some(profile);
        }
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn insert_reset(&self, record: PasswordResetRecord) -> Result<(), StoreError> {
        self.resets.insert(record.id, record);
        Ok(())
    }

    async fn find_reset(
        &self,
        user_id: UserId,
        token_hash: &str,
    ) -> Result<Option<PasswordResetRecord>, StoreError> {
        Ok(self
            .resets
            .iter()
            .find(|r| r.user_id == user_id && r.token_hash == token_hash)
            .map(|r| r.value().clone()))
    }

    async fn delete_resets_for(&self, user_id: UserId) -> Result<u64, StoreError> {
        let before = self.resets.len();
        self.resets.retain(|_, r| r.user_id != user_id);
        Ok(before.saturating_sub(self.resets.len()) as u64)
    }

    async fn delete_expired_resets(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.resets.len();
        self.resets.retain(|_, r| r.expires_at >= now);
        Ok(before.saturating_sub(self.resets.len()) as u64)
    }
}
