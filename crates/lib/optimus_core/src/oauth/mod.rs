//! OAuth sign-in: provider registry, PKCE state and identity resolution.
//!
//! Each provider implements [`OAuthProvider`], including a pure `normalize`
//! that turns its userinfo shape into an [`OAuthProfile`]. Providers are
//! collected in a [`ProviderRegistry`] at startup and injected where needed.

pub mod google;
pub mod microsoft;
pub mod pkce;
pub mod resolver;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub use google::GoogleProvider;
pub use microsoft::MicrosoftProvider;
pub use pkce::{OAuthPendingState, OAuthStateStore};
pub use resolver::{OAuthIdentityResolver, ResolvedIdentity};

/// Default upper bound for provider HTTP calls.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// OAuth errors.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Provider denied authorization: {0}")]
    Denied(String),

    #[error("Provider exchange failed: {0}")]
    Exchange(String),

    #[error("Unusable provider profile: {0}")]
    Profile(String),
}

/// Provider profile reduced to what account linking needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider: String,
    pub provider_id: String,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

/// Client credentials for one provider.
#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Where the provider sends the user back, e.g. `{base}/google/callback`.
    pub redirect_uri: Url,
    pub timeout: Duration,
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// An external identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Path segment identifying the provider (`google`, `microsoft`).
    fn name(&self) -> &'static str;

    /// Consent URL the user is redirected to.
    fn authorize_url(&self, state: &str, code_challenge: &str) -> Result<Url, OAuthError>;

    /// Exchange the authorization code and fetch the raw userinfo document.
    async fn fetch_profile(&self, code: &str, code_verifier: &str) -> Result<Value, OAuthError>;

    /// Reduce the provider-specific userinfo document to an [`OAuthProfile`].
    fn normalize(&self, raw: &Value) -> Result<OAuthProfile, OAuthError>;
}

/// Providers enabled for this deployment, keyed by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) -> &mut Self {
        self.providers.insert(provider.name(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn OAuthProvider>, OAuthError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| OAuthError::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

pub(crate) fn parse_endpoint(url: &str) -> Result<Url, OAuthError> {
    Url::parse(url).map_err(|e| OAuthError::Exchange(format!("bad endpoint {url}: {e}")))
}

/// Token endpoint response (only the field we use).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, OAuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| OAuthError::Exchange(format!("http client build: {e}")))
}

/// Authorization-code + PKCE exchange followed by a userinfo fetch.
pub(crate) async fn exchange_and_fetch(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    token_url: &str,
    userinfo_url: &str,
    code: &str,
    code_verifier: &str,
) -> Result<Value, OAuthError> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("code_verifier", code_verifier),
    ];

    let resp = client
        .post(token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| OAuthError::Exchange(format!("token exchange failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(OAuthError::Exchange(format!(
            "token exchange HTTP {status}: {body}"
        )));
    }

    let tokens = resp
        .json::<TokenResponse>()
        .await
        .map_err(|e| OAuthError::Exchange(format!("token response parse error: {e}")))?;

    let resp = client
        .get(userinfo_url)
        .bearer_auth(&tokens.access_token)
        .send()
        .await
        .map_err(|e| OAuthError::Exchange(format!("userinfo request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        return Err(OAuthError::Exchange(format!("userinfo HTTP {status}")));
    }

    resp.json::<Value>()
        .await
        .map_err(|e| OAuthError::Exchange(format!("userinfo parse error: {e}")))
}

/// Non-empty string at `key`.
pub(crate) fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Email from the passport-style `emails: [{value}]` array.
pub(crate) fn first_listed_email(raw: &Value) -> Option<String> {
    raw.get("emails")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(|entry| entry.get("value"))
        .and_then(Value::as_str)
        .filter(|s| s.contains('@'))
        .map(str::to_string)
}
