//! Password reset ledger.
//!
//! Per user the ledger moves `NoActiveToken → TokenIssued → {Consumed,
//! Expired, Superseded}` and always collapses back to `NoActiveToken`. Only
//! the SHA-256 of a reset token is stored; the raw token exists solely in
//! the email sent to the account owner.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use base64::Engine;
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{AuthError, PasswordHasher};
use crate::mail::{Mailer, reset_email};
use crate::models::auth::{PasswordResetRecord, UserId, normalize_email};
use crate::store::{CredentialStore, ResetTokenStore};

/// Default reset token lifetime: 1 hour.
pub const DEFAULT_RESET_TTL_SECS: i64 = 60 * 60;

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct ResetConfig {
    pub ttl: Duration,
    /// Base URL of the frontend; the reset link is `{base}/reset-password`.
    pub frontend_url: Url,
    /// Upper bound on one mail dispatch.
    pub mail_timeout: StdDuration,
}

/// Handle on a background reset-mail dispatch.
///
/// Dropping it detaches the dispatch; the request that produced it never
/// waits on mail delivery.
#[must_use = "drop to detach, or call `wait` to await delivery"]
pub struct MailDispatch(Option<JoinHandle<()>>);

impl MailDispatch {
    /// Wait until the dispatch finished (successfully or not).
    pub async fn wait(self) {
        if let Some(handle) = self.0 {
            let _ = handle.await;
        }
    }
}

/// Issues and resolves single-use, time-boxed password reset tokens.
pub struct PasswordResetLedger {
    users: Arc<dyn CredentialStore>,
    resets: Arc<dyn ResetTokenStore>,
    mailer: Arc<dyn Mailer>,
    hasher: PasswordHasher,
    config: ResetConfig,
}

impl PasswordResetLedger {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        resets: Arc<dyn ResetTokenStore>,
        mailer: Arc<dyn Mailer>,
        hasher: PasswordHasher,
        config: ResetConfig,
    ) -> Self {
        Self {
            users,
            resets,
            mailer,
            hasher,
            config,
        }
    }

    /// Start a reset for `email`.
    ///
    /// Unknown emails are a silent no-op: the caller gets the same `Ok` as
    /// for a real account. Either way the call returns after the one account
    /// lookup; superseding old records, storing the new one and sending the
    /// mail run in the background and their failures are only logged.
    pub async fn request_reset(&self, email: &str) -> Result<MailDispatch, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            debug!("password reset requested for unknown email");
            return Ok(MailDispatch(None));
        };

        let raw_token = generate_reset_token();
        let now = Utc::now();
        let record = PasswordResetRecord {
            id: Uuid::now_v7(),
            user_id: user.id,
            token_hash: hash_reset_token(&raw_token),
            expires_at: now + self.config.ttl,
            created_at: now,
        };
        let mail = reset_email(&user.email, &self.reset_url(&raw_token, user.id));

        let resets = Arc::clone(&self.resets);
        let mailer = Arc::clone(&self.mailer);
        let timeout = self.config.mail_timeout;
        let user_id = user.id;
        let handle = tokio::spawn(async move {
            let superseded = match resets.delete_resets_for(user_id).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(%user_id, error = %e, "failed superseding reset tokens");
                    return;
                }
            };
            if let Err(e) = resets.insert_reset(record).await {
                warn!(%user_id, error = %e, "failed storing reset token");
                return;
            }
            info!(%user_id, superseded, "password reset token issued");

            match tokio::time::timeout(timeout, mailer.send(mail)).await {
                Ok(Ok(())) => debug!(%user_id, "reset email dispatched"),
                Ok(Err(e)) => warn!(%user_id, error = %e, "failed sending reset email"),
                Err(_) => warn!(%user_id, ?timeout, "reset email dispatch timed out"),
            }
        });
        Ok(MailDispatch(Some(handle)))
    }

    /// Consume a reset token and set a new password.
    ///
    /// Every failure collapses into [`AuthError::InvalidOrExpiredToken`].
    /// The credential update commits before the records are deleted; a record
    /// older than the user's last password change is treated as consumed.
    pub async fn resolve_reset(
        &self,
        user_id: UserId,
        raw_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::Validation("Missing fields".into()));
        }

        let token_hash = hash_reset_token(raw_token);
        let Some(record) = self.resets.find_reset(user_id, &token_hash).await? else {
            return Err(AuthError::InvalidOrExpiredToken);
        };

        let now = Utc::now();
        if record.expires_at < now {
            self.resets.delete_resets_for(user_id).await?;
            debug!(%user_id, "expired reset token purged");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let Some(user) = self.users.find_by_id(user_id).await? else {
            self.resets.delete_resets_for(user_id).await?;
            return Err(AuthError::InvalidOrExpiredToken);
        };
        if user.password_changed_at > record.created_at {
            self.resets.delete_resets_for(user_id).await?;
            debug!(%user_id, "stale reset token purged");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let password_hash = self.hasher.hash(new_password).await?;
        if !self
            .users
            .update_password_hash(user_id, &password_hash, Utc::now())
            .await?
        {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        self.resets.delete_resets_for(user_id).await?;

        info!(%user_id, "password reset completed");
        Ok(())
    }

    /// Remove all expired reset records.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let removed = self.resets.delete_expired_resets(Utc::now()).await?;
        if removed > 0 {
            debug!(removed, "purged expired reset tokens");
        }
        Ok(removed)
    }

    /// Spawn a periodic expired-record sweep.
    pub fn spawn_sweep_task(self: &Arc<Self>, every: StdDuration) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = ledger.purge_expired().await {
                    warn!(error = %e, "reset token sweep failed");
                }
            }
        })
    }

    fn reset_url(&self, raw_token: &str, user_id: UserId) -> Url {
        let mut url = self.config.frontend_url.clone();
        let path = format!("{}/reset-password", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("token", raw_token)
            .append_pair("id", &user_id.to_string());
        url
    }
}

/// 256 bits of randomness, URL-safe base64.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hash a reset token for storage.
pub fn hash_reset_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
