//! OAuth start and callback handlers.

use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::Form;
use axum_extra::extract::CookieJar;
use optimus_core::oauth::OAuthError;
use optimus_core::oauth::pkce::DEFAULT_STATE_TTL;
use optimus_core::oauth::resolver::OAuthResolveError;
use tracing::{error, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::OAuthCallbackParams;
use crate::services::cookies;
use crate::services::oauth::{self, CallbackStatus};

/// `GET /auth/oauth/{provider}`: redirect to the provider.
pub async fn start_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let (url, state_key) = oauth::begin(&state, &provider)?;
    let jar = jar.add(cookies::oauth_state_cookie(
        &state_key,
        DEFAULT_STATE_TTL,
        state.config.secure_cookies,
    ));
    Ok((jar, Redirect::to(url.as_str())))
}

/// `GET /auth/{provider}/callback`
pub async fn callback_get_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Query(params): Query<OAuthCallbackParams>,
) -> AppResult<(CookieJar, Redirect)> {
    callback(state, &provider, jar, params).await
}

/// `POST /auth/{provider}/callback`: providers using `response_mode=form_post`.
pub async fn callback_post_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Form(params): Form<OAuthCallbackParams>,
) -> AppResult<(CookieJar, Redirect)> {
    callback(state, &provider, jar, params).await
}

/// Tokens only travel in cookies; the frontend learns the outcome from the
/// redirect's query string.
async fn callback(
    state: AppState,
    provider: &str,
    jar: CookieJar,
    params: OAuthCallbackParams,
) -> AppResult<(CookieJar, Redirect)> {
    let frontend = &state.config.frontend_url;
    let browser_state = jar
        .get(cookies::OAUTH_STATE_COOKIE)
        .map(|c| c.value().to_string());
    let jar = cookies::without_oauth_state(jar, state.config.secure_cookies);
    match oauth::complete(&state, provider, browser_state.as_deref(), params).await {
        Ok((session, linked_existing)) => {
            let jar = cookies::with_tokens(
                jar,
                &session.tokens,
                state.tokens.access_ttl(),
                state.tokens.refresh_ttl(),
                state.config.secure_cookies,
            );
            let to = oauth::frontend_redirect(frontend, CallbackStatus::Success, linked_existing);
            Ok((jar, Redirect::to(to.as_str())))
        }
        Err(OAuthResolveError::Provider(OAuthError::UnknownProvider(name))) => {
            Err(AppError::from(OAuthError::UnknownProvider(name)))
        }
        Err(OAuthResolveError::Provider(e)) => {
            warn!(provider, error = %e, "OAuth callback failed");
            let to = oauth::frontend_redirect(frontend, CallbackStatus::Fail, false);
            Ok((jar, Redirect::to(to.as_str())))
        }
        Err(OAuthResolveError::Auth(e)) => {
            error!(provider, error = %e, "OAuth account resolution failed");
            let to = oauth::frontend_redirect(frontend, CallbackStatus::Error, false);
            Ok((jar, Redirect::to(to.as_str())))
        }
    }
}
