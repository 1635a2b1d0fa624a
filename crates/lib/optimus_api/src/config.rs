//! API server configuration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use optimus_core::auth::jwt::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, resolve_secret};
use optimus_core::auth::password::{BCRYPT_COST, DEFAULT_HASH_WORKERS};
use optimus_core::auth::reset::DEFAULT_RESET_TTL_SECS;
use optimus_core::auth::TokenConfig;
use optimus_core::mail::{DEFAULT_MAIL_TIMEOUT, MailConfig};
use optimus_core::oauth::{
    DEFAULT_PROVIDER_TIMEOUT, GoogleProvider, MicrosoftProvider, OAuthClientConfig, OAuthError,
    ProviderRegistry,
};
use tracing::warn;
use url::Url;

const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_OAUTH_CALLBACK_BASE: &str = "http://localhost:4000/api/v1/auth";

/// Client id/secret pair for one OAuth provider.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// OAuth provider wiring.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    /// Base of the callback URLs; a provider's callback is `{base}/{name}/callback`.
    pub callback_base: Url,
    pub timeout: StdDuration,
    pub google: Option<ProviderCredentials>,
    pub microsoft: Option<ProviderCredentials>,
    /// Entra directory for Microsoft sign-in (`common` when unset).
    pub microsoft_directory: String,
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:4000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Signing secrets and token lifetimes.
    pub tokens: TokenConfig,
    pub reset_ttl: Duration,
    /// Frontend base URL for redirects and reset links.
    pub frontend_url: Url,
    /// Set the `Secure` flag on auth cookies.
    pub secure_cookies: bool,
    pub bcrypt_cost: u32,
    pub hash_workers: usize,
    pub mail: MailConfig,
    pub oauth: OAuthConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                         | Default                              |
    /// |----------------------------------|--------------------------------------|
    /// | `BIND_ADDR`                      | `127.0.0.1:4000`                     |
    /// | `DATABASE_URL`                   | `postgres://localhost:5432/optimus`  |
    /// | `JWT_SECRET` / `AUTH_SECRET`     | generated & persisted to file        |
    /// | `REFRESH_SECRET`                 | generated & persisted to file        |
    /// | `JWT_EXPIRES` / `REFRESH_EXPIRES`| `900` / `604800` seconds             |
    /// | `RESET_TOKEN_TTL_SECS`           | `3600`                               |
    /// | `FRONTEND_URL`                   | `http://localhost:5173`              |
    /// | `APP_ENV`                        | `production` enables secure cookies  |
    /// | `BCRYPT_COST` / `HASH_WORKERS`   | `10` / `4`                           |
    /// | `MAIL_API_URL` / `MAIL_API_KEY`  | unset (mail is logged, not sent)     |
    /// | `FROM_EMAIL`                     | `no-reply@optimus.com`               |
    /// | `MAIL_TIMEOUT_SECS`              | `10`                                 |
    /// | `OAUTH_CALLBACK_BASE`            | `http://localhost:4000/api/v1/auth`  |
    /// | `GOOGLE_CLIENT_ID` / `_SECRET`   | unset (provider disabled)            |
    /// | `MICROSOFT_CLIENT_ID` / `_SECRET`| unset (provider disabled)            |
    /// | `MICROSOFT_TENANT_ID`            | `common`                             |
    /// | `OAUTH_TIMEOUT_SECS`             | `10`                                 |
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:4000"),
            pg_connection_url: env_or("DATABASE_URL", "postgres://localhost:5432/optimus"),
            tokens: TokenConfig {
                access_secret: resolve_secret(&["JWT_SECRET", "AUTH_SECRET"], "jwt-access-secret"),
                refresh_secret: resolve_secret(&["REFRESH_SECRET"], "jwt-refresh-secret"),
                access_ttl: Duration::seconds(env_parse("JWT_EXPIRES", DEFAULT_ACCESS_TTL_SECS)),
                refresh_ttl: Duration::seconds(env_parse(
                    "REFRESH_EXPIRES",
                    DEFAULT_REFRESH_TTL_SECS,
                )),
            },
            reset_ttl: Duration::seconds(env_parse("RESET_TOKEN_TTL_SECS", DEFAULT_RESET_TTL_SECS)),
            frontend_url: env_url("FRONTEND_URL", DEFAULT_FRONTEND_URL),
            secure_cookies: std::env::var("APP_ENV").is_ok_and(|v| v == "production"),
            bcrypt_cost: env_parse("BCRYPT_COST", BCRYPT_COST),
            hash_workers: env_parse("HASH_WORKERS", DEFAULT_HASH_WORKERS),
            mail: MailConfig {
                api_url: std::env::var("MAIL_API_URL")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .and_then(|v| parse_url("MAIL_API_URL", &v)),
                api_key: std::env::var("MAIL_API_KEY").ok().filter(|v| !v.is_empty()),
                from: env_or("FROM_EMAIL", "no-reply@optimus.com"),
                timeout: StdDuration::from_secs(env_parse(
                    "MAIL_TIMEOUT_SECS",
                    DEFAULT_MAIL_TIMEOUT.as_secs(),
                )),
            },
            oauth: OAuthConfig {
                callback_base: env_url("OAUTH_CALLBACK_BASE", DEFAULT_OAUTH_CALLBACK_BASE),
                timeout: StdDuration::from_secs(env_parse(
                    "OAUTH_TIMEOUT_SECS",
                    DEFAULT_PROVIDER_TIMEOUT.as_secs(),
                )),
                google: credentials("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
                microsoft: credentials("MICROSOFT_CLIENT_ID", "MICROSOFT_CLIENT_SECRET"),
                microsoft_directory: env_or("MICROSOFT_TENANT_ID", "common"),
            },
        }
    }

    /// Build the registry of configured OAuth providers.
    pub fn provider_registry(&self) -> Result<ProviderRegistry, OAuthError> {
        let mut registry = ProviderRegistry::new();
        if let Some(creds) = &self.oauth.google
            && let Some(config) = self.oauth_client("google", creds)
        {
            registry.register(Arc::new(GoogleProvider::new(config)?));
        }
        if let Some(creds) = &self.oauth.microsoft
            && let Some(config) = self.oauth_client("microsoft", creds)
        {
            registry.register(Arc::new(MicrosoftProvider::new(
                config,
                &self.oauth.microsoft_directory,
            )?));
        }
        Ok(registry)
    }

    fn oauth_client(&self, name: &str, creds: &ProviderCredentials) -> Option<OAuthClientConfig> {
        let base = self.oauth.callback_base.as_str().trim_end_matches('/');
        let redirect_uri = parse_url("OAUTH_CALLBACK_BASE", &format!("{base}/{name}/callback"))?;
        Some(OAuthClientConfig {
            client_id: creds.client_id.clone(),
            client_secret: creds.client_secret.clone(),
            redirect_uri,
            timeout: self.oauth.timeout,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw.trim().parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, "unparseable value, using default");
            default
        }),
        _ => default,
    }
}

fn parse_url(name: &str, raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(var = name, error = %e, "invalid URL");
            None
        }
    }
}

fn env_url(name: &str, default: &'static str) -> Url {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .and_then(|v| parse_url(name, &v))
        .unwrap_or_else(|| Url::parse(default).expect("default URL is valid"))
}

fn credentials(id_var: &str, secret_var: &str) -> Option<ProviderCredentials> {
    let client_id = std::env::var(id_var).ok().filter(|v| !v.is_empty())?;
    let client_secret = std::env::var(secret_var).ok().filter(|v| !v.is_empty())?;
    Some(ProviderCredentials {
        client_id,
        client_secret,
    })
}
