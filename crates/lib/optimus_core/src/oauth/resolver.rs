//! Find-or-create of local identities from provider profiles.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::{OAuthError, OAuthProfile, OAuthProvider};
use crate::auth::AuthError;
use crate::auth::password::{is_unusable, unusable_hash};
use crate::models::auth::{Identity, NewIdentity, Role, normalize_email};
use crate::store::{CredentialStore, StoreError};

/// Outcome of resolving a provider profile.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    /// The profile's email matched an account that already existed, which
    /// was adopted without further proof. Callers must surface this.
    pub linked_existing: bool,
}

/// Maps provider profiles onto local identities, one account per email.
pub struct OAuthIdentityResolver {
    users: Arc<dyn CredentialStore>,
}

impl OAuthIdentityResolver {
    pub fn new(users: Arc<dyn CredentialStore>) -> Self {
        Self { users }
    }

    /// Normalize a raw provider document and resolve it.
    pub async fn resolve_raw(
        &self,
        provider: &dyn OAuthProvider,
        raw: &Value,
    ) -> Result<ResolvedIdentity, OAuthResolveError> {
        let profile = provider.normalize(raw)?;
        Ok(self.resolve(&profile).await?)
    }

    /// Find the identity for the profile's email, creating an Applicant
    /// account with an unusable password if there is none.
    ///
    /// Safe under concurrent calls for the same new email: the losing insert
    /// hits the unique constraint and re-reads the winner's record.
    pub async fn resolve(&self, profile: &OAuthProfile) -> Result<ResolvedIdentity, AuthError> {
        let email = canonical_email(profile);

        if let Some(identity) = self.users.find_by_email(&email).await? {
            warn!(
                user_id = %identity.id,
                provider = %profile.provider,
                "OAuth sign-in adopted existing account by email"
            );
            return Ok(ResolvedIdentity {
                identity,
                linked_existing: true,
            });
        }

        let new = NewIdentity {
            email: email.clone(),
            first_name: profile
                .given_name
                .clone()
                .unwrap_or_else(|| "User".to_string()),
            last_name: profile.family_name.clone(),
            password_hash: unusable_hash(),
            role: Role::Applicant,
            tenant_id: None,
        };

        match self.users.create(new).await {
            Ok(identity) => {
                info!(user_id = %identity.id, provider = %profile.provider, "created account from OAuth profile");
                Ok(ResolvedIdentity {
                    identity,
                    linked_existing: false,
                })
            }
            Err(StoreError::DuplicateEmail) => {
                // Lost a creation race. A winner holding a password is an
                // existing account being adopted.
                let identity = self
                    .users
                    .find_by_email(&email)
                    .await?
                    .ok_or_else(|| AuthError::Internal("account vanished after conflict".into()))?;
                let linked_existing = !is_unusable(&identity.password_hash);
                if linked_existing {
                    warn!(
                        user_id = %identity.id,
                        provider = %profile.provider,
                        "OAuth sign-in adopted concurrently registered account"
                    );
                }
                Ok(ResolvedIdentity {
                    identity,
                    linked_existing,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Errors from [`OAuthIdentityResolver::resolve_raw`].
#[derive(Debug, thiserror::Error)]
pub enum OAuthResolveError {
    #[error(transparent)]
    Provider(#[from] OAuthError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// The profile's normalized email, or a deterministic placeholder scoped to
/// provider and provider id so the account can still be created and linked.
pub fn canonical_email(profile: &OAuthProfile) -> String {
    match profile.email.as_deref().map(normalize_email) {
        Some(email) if email.contains('@') => email,
        _ => normalize_email(&format!(
            "oauth-{}-{}@noemail.local",
            profile.provider, profile.provider_id
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::models::auth::{ProfileUpdate, TenantId, UserId};
    use crate::store::MemoryStore;

    /// Hides existing accounts from the first email lookup, as if another
    /// request created the account right after it.
    struct LateWinnerStore {
        inner: MemoryStore,
        hidden: AtomicBool,
    }

    #[async_trait]
    impl CredentialStore for LateWinnerStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
            if self.hidden.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_by_email(email).await
        }

        async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError> {
            self.inner.create(new).await
        }

        async fn update_password_hash(
            &self,
            id: UserId,
            password_hash: &str,
            changed_at: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            self.inner
                .update_password_hash(id, password_hash, changed_at)
                .await
        }

        async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
            self.inner.record_login(id, at).await
        }

        async fn update_profile(
            &self,
            id: UserId,
            update: ProfileUpdate,
        ) -> Result<Option<Identity>, StoreError> {
            self.inner.update_profile(id, update).await
        }
    }

    async fn late_winner(password_hash: String) -> Arc<LateWinnerStore> {
        let inner = MemoryStore::new();
        inner
            .create(NewIdentity {
                email: "ana@x.com".into(),
                first_name: "Ana".into(),
                last_name: None,
                password_hash,
                role: Role::Applicant,
                tenant_id: None,
            })
            .await
            .unwrap();
        Arc::new(LateWinnerStore {
            inner,
            hidden: AtomicBool::new(true),
        })
    }

    fn profile(email: Option<&str>) -> OAuthProfile {
        OAuthProfile {
            provider: "google".into(),
            provider_id: "g-42".into(),
            email: email.map(str::to_string),
            given_name: Some("Ana".into()),
            family_name: None,
        }
    }

    #[test]
    fn placeholder_email_is_deterministic() {
        assert_eq!(canonical_email(&profile(None)), "oauth-google-g-42@noemail.local");
        assert_eq!(canonical_email(&profile(Some(" Ana@X.com "))), "ana@x.com");
    }

    #[tokio::test]
    async fn new_profile_creates_least_privileged_account() {
        let store = Arc::new(MemoryStore::new());
        let resolver = OAuthIdentityResolver::new(store.clone());
        let resolved = resolver.resolve(&profile(Some("ana@x.com"))).await.unwrap();
        assert!(!resolved.linked_existing);
        assert_eq!(resolved.identity.role, Role::Applicant);
        assert_eq!(resolved.identity.tenant_id, None);
        assert!(is_unusable(&resolved.identity.password_hash));
    }

    #[tokio::test]
    async fn existing_account_is_adopted_and_flagged() {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId(uuid::Uuid::new_v4());
        let existing = store
            .create(NewIdentity {
                email: "ana@x.com".into(),
                first_name: "Ana".into(),
                last_name: None,
                password_hash: "$2b$hash".into(),
                role: Role::Employer,
                tenant_id: Some(tenant),
            })
            .await
            .unwrap();
        let resolver = OAuthIdentityResolver::new(store.clone());
        let resolved = resolver.resolve(&profile(Some("ANA@x.com"))).await.unwrap();
        assert!(resolved.linked_existing);
        assert_eq!(resolved.identity.id, existing.id);
        assert_eq!(resolved.identity.role, Role::Employer);
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn profile_without_email_is_still_linkable() {
        let store = Arc::new(MemoryStore::new());
        let resolver = OAuthIdentityResolver::new(store.clone());
        let first = resolver.resolve(&profile(None)).await.unwrap();
        let second = resolver.resolve(&profile(None)).await.unwrap();
        assert_eq!(first.identity.id, second.identity.id);
        assert_eq!(first.identity.email, "oauth-google-g-42@noemail.local");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolves_converge_to_one_identity() {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(OAuthIdentityResolver::new(store.clone()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                resolver.resolve(&profile(Some("new@x.com"))).await.unwrap()
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().identity.id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn losing_race_to_password_account_is_flagged() {
        let store = late_winner("$2b$hash".into()).await;
        let resolver = OAuthIdentityResolver::new(store.clone());
        let resolved = resolver.resolve(&profile(Some("ana@x.com"))).await.unwrap();
        assert!(resolved.linked_existing);
        assert_eq!(resolved.identity.first_name, "Ana");
        assert_eq!(store.inner.user_count(), 1);
    }

    #[tokio::test]
    async fn losing_race_to_oauth_account_is_not_flagged() {
        let store = late_winner(unusable_hash()).await;
        let resolver = OAuthIdentityResolver::new(store.clone());
        let resolved = resolver.resolve(&profile(Some("ana@x.com"))).await.unwrap();
        assert!(!resolved.linked_existing);
        assert_eq!(store.inner.user_count(), 1);
    }
}
