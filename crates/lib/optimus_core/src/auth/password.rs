//! Password hashing via bcrypt on a bounded blocking pool.
//!
//! bcrypt is deliberately slow, so every hash/verify runs on tokio's blocking
//! threads behind a semaphore. Requests awaiting a hash are suspended, not
//! blocking the reactor, and at most `workers` hashes run at once.

use std::sync::Arc;

use base64::Engine;
use rand::RngCore;
use tokio::sync::{OnceCell, Semaphore};

use super::AuthError;

/// bcrypt cost factor.
pub const BCRYPT_COST: u32 = 10;

/// Default number of concurrent hash jobs.
pub const DEFAULT_HASH_WORKERS: usize = 4;

/// Prefix marking a credential hash that can never verify.
const UNUSABLE_PREFIX: char = '!';

/// Bounded bcrypt worker pool. Cheap to clone.
#[derive(Clone)]
pub struct PasswordHasher {
    permits: Arc<Semaphore>,
    cost: u32,
    dummy_hash: Arc<OnceCell<String>>,
}

impl PasswordHasher {
    pub fn new(workers: usize, cost: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            cost,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Hash a password with bcrypt.
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let cost = self.cost;
        self.run(move || {
            bcrypt::hash(password, cost)
                .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
        })
        .await
    }

    /// Verify a password against a stored hash. Unusable hashes never match
    /// but still cost one bcrypt verify.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        if is_unusable(hash) {
            self.verify_dummy(password).await?;
            return Ok(false);
        }
        self.bcrypt_verify(password, hash).await
    }

    /// Spend the same work as a real verify when there is no usable
    /// credential, so response latency does not reveal what kind of account
    /// (if any) sits behind an email.
    pub async fn verify_dummy(&self, password: &str) -> Result<(), AuthError> {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.hash("optimus-dummy-credential"))
            .await?
            .clone();
        self.bcrypt_verify(password, &dummy).await.map(|_| ())
    }

    async fn bcrypt_verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let password = password.to_string();
        let hash = hash.to_string();
        self.run(move || {
            bcrypt::verify(password, &hash)
                .map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
        })
        .await
    }

    /// Number of hash slots currently free.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    async fn run<T, F>(&self, job: F) -> Result<T, AuthError>
    where
        F: FnOnce() -> Result<T, AuthError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AuthError::Internal("hash pool closed".into()))?;
        tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| AuthError::Internal(format!("hash task: {e}")))?
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_WORKERS, BCRYPT_COST)
    }
}

/// A random credential hash that no password verifies against.
pub fn unusable_hash() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    format!(
        "{UNUSABLE_PREFIX}{}",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    )
}

pub fn is_unusable(hash: &str) -> bool {
    hash.starts_with(UNUSABLE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(2, 4)
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let h = hasher();
        let hash = h.hash("Secr3t!").await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(h.verify("Secr3t!", &hash).await.unwrap());
        assert!(!h.verify("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn unusable_hash_never_verifies() {
        let h = hasher();
        let hash = unusable_hash();
        assert!(is_unusable(&hash));
        assert!(!h.verify("", &hash).await.unwrap());
        assert!(!h.verify(&hash, &hash).await.unwrap());
        assert_ne!(unusable_hash(), hash);
    }

    #[tokio::test]
    async fn unusable_hash_still_pays_for_a_verify() {
        let h = hasher();
        assert!(!h.dummy_hash.initialized());
        assert!(!h.verify("guess", &unusable_hash()).await.unwrap());
        assert!(h.dummy_hash.initialized());
    }

    #[tokio::test]
    async fn dummy_verify_succeeds_and_releases_permits() {
        let h = hasher();
        h.verify_dummy("anything").await.unwrap();
        h.verify_dummy("anything").await.unwrap();
        assert_eq!(h.available_workers(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hashing_does_not_stall_the_runtime() {
        let h = PasswordHasher::new(1, 8);
        let job = tokio::spawn({
            let h = h.clone();
            async move { h.hash("slow").await }
        });
        // The single runtime thread is free to run other tasks meanwhile.
        let ticked = tokio::spawn(async { 42 }).await.unwrap();
        assert_eq!(ticked, 42);
        assert!(job.await.unwrap().is_ok());
    }
}
