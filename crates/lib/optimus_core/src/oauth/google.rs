//! Google (OpenID Connect) provider.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{
    OAuthClientConfig, OAuthError, OAuthProfile, OAuthProvider, exchange_and_fetch,
    first_listed_email, http_client, parse_endpoint, str_field,
};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

pub struct GoogleProvider {
    config: OAuthClientConfig,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: OAuthClientConfig) -> Result<Self, OAuthError> {
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self, state: &str, code_challenge: &str) -> Result<Url, OAuthError> {
        let mut url = parse_endpoint(AUTH_URL)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    async fn fetch_profile(&self, code: &str, code_verifier: &str) -> Result<Value, OAuthError> {
        exchange_and_fetch(
            &self.client,
            &self.config,
            TOKEN_URL,
            USERINFO_URL,
            code,
            code_verifier,
        )
        .await
    }

    fn normalize(&self, raw: &Value) -> Result<OAuthProfile, OAuthError> {
        normalize(raw)
    }
}

/// Google userinfo: `{sub, email, email_verified, given_name, family_name}`.
/// An email Google marks unverified is not used for linking.
pub fn normalize(raw: &Value) -> Result<OAuthProfile, OAuthError> {
    let provider_id = str_field(raw, "sub")
        .or_else(|| str_field(raw, "id"))
        .ok_or_else(|| OAuthError::Profile("google profile without subject".into()))?;

    let verified = raw
        .get("email_verified")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let email = str_field(raw, "email")
        .filter(|_| verified)
        .or_else(|| first_listed_email(raw));

    let name = raw.get("name");
    Ok(OAuthProfile {
        provider: "google".into(),
        provider_id,
        email,
        given_name: str_field(raw, "given_name")
            .or_else(|| name.and_then(|n| str_field(n, "givenName"))),
        family_name: str_field(raw, "family_name")
            .or_else(|| name.and_then(|n| str_field(n, "familyName"))),
    })
}
