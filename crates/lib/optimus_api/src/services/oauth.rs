//! OAuth sign-in: authorization redirect and callback completion.

use optimus_core::oauth::pkce::{compute_code_challenge, generate_code_verifier, generate_state};
use optimus_core::oauth::resolver::OAuthResolveError;
use optimus_core::oauth::{OAuthError, OAuthPendingState};
use tracing::{info, warn};
use url::Url;

use crate::AppState;
use crate::models::OAuthCallbackParams;
use crate::services::auth::Session;

/// Result flag carried to the frontend in the `oauth` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Success,
    /// The provider or the exchange failed.
    Fail,
    /// We failed after the provider vouched for the user.
    Error,
}

impl CallbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackStatus::Success => "success",
            CallbackStatus::Fail => "fail",
            CallbackStatus::Error => "error",
        }
    }
}

/// Build the provider authorization URL and remember the PKCE verifier
/// under a fresh `state`.
///
/// Returns the URL and the `state`; the caller pins the latter to the
/// browser so only that browser can complete the flow.
pub fn begin(state: &AppState, provider: &str) -> Result<(Url, String), OAuthError> {
    let provider = state.providers.get(provider)?;
    let verifier = generate_code_verifier();
    let challenge = compute_code_challenge(&verifier);
    let state_key = generate_state();
    let url = provider.authorize_url(&state_key, &challenge)?;
    state.oauth_state.insert(
        state_key.clone(),
        OAuthPendingState::new(provider.name(), verifier),
    );
    Ok((url, state_key))
}

/// Finish a callback: check `state` against the store and against the
/// value pinned to the browser, exchange the code, resolve the profile to
/// an identity and issue tokens.
///
/// Returns the session and whether an existing account was adopted.
pub async fn complete(
    state: &AppState,
    provider: &str,
    browser_state: Option<&str>,
    params: OAuthCallbackParams,
) -> Result<(Session, bool), OAuthResolveError> {
    let provider = state.providers.get(provider)?;
    if let Some(error) = params.error {
        return Err(OAuthError::Denied(error).into());
    }
    let state_key = params.state.ok_or(OAuthError::InvalidState)?;
    if browser_state != Some(state_key.as_str()) {
        return Err(OAuthError::InvalidState.into());
    }
    let pending = state
        .oauth_state
        .take(&state_key, provider.name())
        .ok_or(OAuthError::InvalidState)?;
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| OAuthError::Denied("missing authorization code".into()))?;

    let timeout = state.config.oauth.timeout;
    let raw = tokio::time::timeout(timeout, provider.fetch_profile(&code, &pending.pkce_verifier))
        .await
        .map_err(|_| OAuthError::Exchange(format!("timed out after {timeout:?}")))??;

    let resolved = state.oauth.resolve_raw(provider.as_ref(), &raw).await?;
    if resolved.linked_existing {
        warn!(
            user_id = %resolved.identity.id,
            provider = provider.name(),
            "OAuth sign-in linked to an existing account"
        );
    }
    let tokens = state.tokens.issue_pair(&resolved.identity)?;
    info!(user_id = %resolved.identity.id, provider = provider.name(), "OAuth sign-in");
    Ok((
        Session {
            identity: resolved.identity,
            tokens,
        },
        resolved.linked_existing,
    ))
}

/// Frontend landing URL: `{frontend}/?oauth=<status>[&linked=existing]`.
pub fn frontend_redirect(frontend: &Url, status: CallbackStatus, linked_existing: bool) -> Url {
    let mut url = frontend.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("oauth", status.as_str());
        if linked_existing {
            query.append_pair("linked", "existing");
        }
    }
    url
}
