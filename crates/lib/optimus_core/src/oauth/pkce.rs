//! PKCE and CSRF state for the OAuth redirect round trip.

use std::time::{Duration, Instant};

use base64::Engine;
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// How long a sign-in may sit between redirect and callback.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

const CLEANUP_EVERY: Duration = Duration::from_secs(60);

/// Generate a cryptographic PKCE code verifier (43 chars, URL-safe).
pub fn generate_code_verifier() -> String {
    random_url_safe::<32>()
}

/// Compute S256 code challenge from a code verifier.
pub fn compute_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a cryptographic state parameter (CSRF token).
pub fn generate_state() -> String {
    random_url_safe::<24>()
}

fn random_url_safe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Pending sign-in stored between start and callback.
#[derive(Debug, Clone)]
pub struct OAuthPendingState {
    pub provider: String,
    pub pkce_verifier: String,
    pub created_at: Instant,
}

impl OAuthPendingState {
    pub fn new(provider: &str, pkce_verifier: String) -> Self {
        Self {
            provider: provider.to_string(),
            pkce_verifier,
            created_at: Instant::now(),
        }
    }
}

/// In-memory store for pending sign-ins, keyed by the `state` parameter.
/// Entries are single-use.
pub struct OAuthStateStore {
    states: DashMap<String, OAuthPendingState>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_STATE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            states: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, state_key: String, pending: OAuthPendingState) {
        self.states.insert(state_key, pending);
    }

    /// Take (remove and return) the entry for `state_key`.
    /// Returns `None` if missing, expired, or issued for another provider.
    pub fn take(&self, state_key: &str, provider: &str) -> Option<OAuthPendingState> {
        let (_, pending) = self.states.remove(state_key)?;
        if pending.created_at.elapsed() > self.ttl || pending.provider != provider {
            return None;
        }
        Some(pending)
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        let before = self.states.len();
        self.states.retain(|_, v| v.created_at.elapsed() <= self.ttl);
        let evicted = before.saturating_sub(self.states.len());
        if evicted > 0 {
            tracing::debug!(evicted, "expired OAuth states evicted");
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_EVERY);
            loop {
                interval.tick().await;
                store.cleanup();
            }
        })
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pending(provider: &str) -> OAuthPendingState {
        OAuthPendingState::new(provider, "verifier".into())
    }

    #[test]
    fn code_verifier_is_url_safe_and_sufficient_length() {
        let verifier = generate_code_verifier();
        assert!(verifier.len() >= 43, "verifier too short: {}", verifier.len());
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "verifier contains non-URL-safe chars: {verifier}"
        );
    }

    #[test]
    fn code_challenge_matches_rfc7636_example() {
        assert_eq!(
            compute_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn state_values_are_unique() {
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn take_is_single_use() {
        let store = OAuthStateStore::new();
        store.insert("k".into(), pending("google"));
        assert!(store.take("k", "google").is_some());
        assert!(store.take("k", "google").is_none());
    }

    #[test]
    fn take_rejects_other_provider_and_burns_entry() {
        let store = OAuthStateStore::new();
        store.insert("k".into(), pending("google"));
        assert!(store.take("k", "microsoft").is_none());
        assert!(store.take("k", "google").is_none());
    }

    #[test]
    fn expired_entries_are_refused_and_evicted() {
        let store = OAuthStateStore::with_ttl(Duration::from_millis(250));
        store.insert("old".into(), pending("google"));
        store.insert("older".into(), pending("google"));
        std::thread::sleep(Duration::from_millis(300));
        store.insert("fresh".into(), pending("google"));

        assert!(store.take("old", "google").is_none());
        store.cleanup();
        assert_eq!(store.len(), 1);
        assert!(store.take("fresh", "google").is_some());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn cleanup_task_can_be_aborted() {
        let store = Arc::new(OAuthStateStore::new());
        let handle = store.spawn_cleanup_task();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
