//! Shared harness: in-memory stores, a recording mailer and a scripted
//! OAuth provider behind the real router.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use chrono::Duration;
use optimus_api::config::{ApiConfig, OAuthConfig};
use optimus_api::{AppState, router};
use optimus_core::auth::TokenConfig;
use optimus_core::mail::{MailConfig, MailError, Mailer, MemoryOutbox, OutboundEmail};
use optimus_core::oauth::{OAuthError, OAuthProfile, OAuthProvider, ProviderRegistry};
use optimus_core::models::auth::UserId;
use optimus_core::store::MemoryStore;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

pub const FRONTEND: &str = "http://app.test";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub outbox: Arc<MemoryOutbox>,
}

/// Response pieces the tests look at.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    /// Cookies set by the response, by name.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| {
                let pair = v.split(';').next()?;
                let (name, value) = pair.split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Header form of this response's cookies, for the next request.
    pub fn cookie_header(&self) -> String {
        self.cookies()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn location(&self) -> String {
        self.headers
            .get("location")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: "postgres://unused".into(),
        tokens: TokenConfig {
            access_secret: "test-access-secret".into(),
            refresh_secret: "test-refresh-secret".into(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        },
        reset_ttl: Duration::hours(1),
        frontend_url: Url::parse(FRONTEND).unwrap(),
        secure_cookies: false,
        bcrypt_cost: 4,
        hash_workers: 2,
        mail: MailConfig {
            timeout: StdDuration::from_secs(1),
            ..MailConfig::default()
        },
        oauth: OAuthConfig {
            callback_base: Url::parse("http://api.test/api/v1/auth").unwrap(),
            timeout: StdDuration::from_millis(200),
            google: None,
            microsoft: None,
            microsoft_directory: "common".into(),
        },
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(ProviderRegistry::new())
}

pub fn spawn_app_with(providers: ProviderRegistry) -> TestApp {
    build(providers, None)
}

/// App whose reset mail goes to `mailer` instead of the recording outbox.
pub fn spawn_app_with_mailer(mailer: Arc<dyn Mailer>) -> TestApp {
    build(ProviderRegistry::new(), Some(mailer))
}

fn build(providers: ProviderRegistry, mailer: Option<Arc<dyn Mailer>>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let outbox = Arc::new(MemoryOutbox::new());
    let mailer = mailer.unwrap_or_else(|| outbox.clone() as Arc<dyn Mailer>);
    let state = AppState::new(test_config(), store.clone(), store.clone(), mailer, providers);
    TestApp {
        router: router(state.clone()),
        state,
        store,
        outbox,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let resp = self.router.clone().oneshot(req).await.expect("request");
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            json,
        }
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.send(json_request(Method::POST, uri, body, None)).await
    }

    /// Wait for the background reset mail to land and pull the raw token
    /// out of its link.
    pub async fn reset_token_from_mail(&self, nth: usize) -> String {
        for _ in 0..100 {
            if let Some(mail) = self.outbox.sent().get(nth) {
                let start = mail.html.find("token=").expect("token in link") + "token=".len();
                let rest = &mail.html[start..];
                return rest[..rest.find('&').expect("id follows token")].to_string();
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!("reset mail #{nth} never sent");
    }

    /// Wait for the background task to store a reset record for `user_id`.
    pub async fn wait_for_reset_record(&self, user_id: UserId) -> bool {
        for _ in 0..100 {
            if !self.store.resets_for(user_id).is_empty() {
                return true;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        false
    }
}

pub fn json_request(method: Method, uri: &str, body: Value, cookies: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(cookies) = cookies {
        builder = builder.header(COOKIE, cookies);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

/// Mail relay that rejects everything.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: OutboundEmail) -> Result<(), MailError> {
        Err(MailError::Transport("connection refused".into()))
    }
}

/// Mail relay that never answers.
pub struct HangingMailer;

#[async_trait]
impl Mailer for HangingMailer {
    async fn send(&self, _email: OutboundEmail) -> Result<(), MailError> {
        std::future::pending().await
    }
}

/// OAuth provider that answers every exchange with a canned document.
pub struct ScriptedProvider {
    pub document: Value,
    pub fail_exchange: bool,
    pub delay: Option<StdDuration>,
}

impl ScriptedProvider {
    pub fn returning(document: Value) -> Self {
        Self {
            document,
            fail_exchange: false,
            delay: None,
        }
    }
}

#[async_trait]
impl OAuthProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn authorize_url(&self, state: &str, code_challenge: &str) -> Result<Url, OAuthError> {
        let mut url = Url::parse("https://idp.test/authorize")
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    async fn fetch_profile(&self, _code: &str, _code_verifier: &str) -> Result<Value, OAuthError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_exchange {
            return Err(OAuthError::Exchange("token endpoint returned 400".into()));
        }
        Ok(self.document.clone())
    }

    fn normalize(&self, raw: &Value) -> Result<OAuthProfile, OAuthError> {
        let provider_id = raw["id"]
            .as_str()
            .ok_or_else(|| OAuthError::Profile("missing id".into()))?;
        Ok(OAuthProfile {
            provider: "scripted".into(),
            provider_id: provider_id.to_string(),
            email: raw["email"].as_str().map(str::to_string),
            given_name: raw["given_name"].as_str().map(str::to_string),
            family_name: raw["family_name"].as_str().map(str::to_string),
        })
    }
}

pub fn registry_with(provider: ScriptedProvider) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(provider));
    registry
}

/// Query parameter `name` of a URL string.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
