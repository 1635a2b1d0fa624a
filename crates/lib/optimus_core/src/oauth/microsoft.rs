//! Microsoft identity platform provider (Graph `/me` profile).

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{
    OAuthClientConfig, OAuthError, OAuthProfile, OAuthProvider, exchange_and_fetch, http_client,
    parse_endpoint, str_field,
};

const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const USERINFO_URL: &str = "https://graph.microsoft.com/v1.0/me";

pub struct MicrosoftProvider {
    config: OAuthClientConfig,
    directory: String,
    client: reqwest::Client,
}

impl MicrosoftProvider {
    /// `directory` is the Entra tenant (`common`, `organizations` or an id).
    pub fn new(config: OAuthClientConfig, directory: &str) -> Result<Self, OAuthError> {
        let client = http_client(config.timeout)?;
        Ok(Self {
            config,
            directory: directory.to_string(),
            client,
        })
    }

    fn endpoint(&self, leaf: &str) -> String {
        format!("{LOGIN_BASE}/{}/oauth2/v2.0/{leaf}", self.directory)
    }
}

#[async_trait]
impl OAuthProvider for MicrosoftProvider {
    fn name(&self) -> &'static str {
        "microsoft"
    }

    fn authorize_url(&self, state: &str, code_challenge: &str) -> Result<Url, OAuthError> {
        let mut url = parse_endpoint(&self.endpoint("authorize"))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("response_mode", "query")
            .append_pair("scope", "openid email profile User.Read")
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    async fn fetch_profile(&self, code: &str, code_verifier: &str) -> Result<Value, OAuthError> {
        exchange_and_fetch(
            &self.client,
            &self.config,
            &self.endpoint("token"),
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

/// Graph `/me`: `{id, mail, userPrincipalName, givenName, surname}`.
/// Falls back to OIDC claim names (`oid`, `email`, `preferred_username`).
///
/// `mail` and the UPN are set by whoever administers the signing-in
/// directory, so they only count as the account email when the profile
/// carries `xms_edov` or `email_verified`. Guest UPNs (`#EXT#`) are not real
/// mailboxes and are skipped.
pub fn normalize(raw: &Value) -> Result<OAuthProfile, OAuthError> {
    let provider_id = str_field(raw, "id")
        .or_else(|| str_field(raw, "oid"))
        .or_else(|| str_field(raw, "sub"))
        .ok_or_else(|| OAuthError::Profile("microsoft profile without id".into()))?;

    let verified = is_set(raw, "xms_edov") || is_set(raw, "email_verified");
    let email = str_field(raw, "mail")
        .or_else(|| str_field(raw, "email"))
        .or_else(|| {
            str_field(raw, "userPrincipalName")
                .or_else(|| str_field(raw, "preferred_username"))
                .filter(|upn| upn.contains('@') && !upn.contains("#EXT#"))
        })
        .filter(|_| verified);

    Ok(OAuthProfile {
        provider: "microsoft".into(),
        provider_id,
        email,
        given_name: str_field(raw, "givenName").or_else(|| str_field(raw, "given_name")),
        family_name: str_field(raw, "surname").or_else(|| str_field(raw, "family_name")),
    })
}

/// Boolean claim, also accepting the string forms some tokens use.
fn is_set(raw: &Value, key: &str) -> bool {
    match raw.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true") || s == "1",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn graph_profile_is_normalized() {
        let profile = normalize(&json!({
            "id": "abc-123",
            "mail": "ana@contoso.com",
            "userPrincipalName": "ana_contoso.com#EXT#@tenant.onmicrosoft.com",
            "givenName": "Ana",
            "surname": "Silva",
            "xms_edov": true
        }))
        .unwrap();
        assert_eq!(profile.provider, "microsoft");
        assert_eq!(profile.provider_id, "abc-123");
        assert_eq!(profile.email.as_deref(), Some("ana@contoso.com"));
        assert_eq!(profile.family_name.as_deref(), Some("Silva"));
    }

    #[test]
    fn upn_is_used_when_mail_is_null() {
        let profile = normalize(&json!({
            "id": "abc",
            "mail": null,
            "userPrincipalName": "bob@contoso.com",
            "email_verified": "true"
        }))
        .unwrap();
        assert_eq!(profile.email.as_deref(), Some("bob@contoso.com"));
    }

    #[test]
    fn unverified_directory_email_is_not_trusted() {
        for raw in [
            json!({"id": "abc", "mail": "ceo@victim.com"}),
            json!({"id": "abc", "userPrincipalName": "ceo@victim.com"}),
            json!({"id": "abc", "mail": "ceo@victim.com", "xms_edov": false}),
        ] {
            let profile = normalize(&raw).unwrap();
            assert_eq!(profile.provider_id, "abc");
            assert_eq!(profile.email, None);
        }
    }

    #[test]
    fn guest_upn_is_not_an_email() {
        let profile = normalize(&json!({
            "id": "abc",
            "userPrincipalName": "bob_x.com#EXT#@tenant.onmicrosoft.com",
            "xms_edov": true
        }))
        .unwrap();
        assert_eq!(profile.email, None);
    }

    #[test]
    fn authorize_url_targets_directory() {
        let provider = MicrosoftProvider::new(
            OAuthClientConfig {
                client_id: "cid".into(),
                client_secret: "s".into(),
                redirect_uri: Url::parse("http://localhost/cb").unwrap(),
                timeout: super::super::DEFAULT_PROVIDER_TIMEOUT,
            },
            "organizations",
        )
        .unwrap();
        let url = provider.authorize_url("st", "ch").unwrap();
        assert!(url.path().starts_with("/organizations/oauth2/v2.0/authorize"));
        let pairs: Vec<_> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("state".into(), "st".into())));
        assert!(pairs.contains(&("code_challenge_method".into(), "S256".into())));
    }
}
