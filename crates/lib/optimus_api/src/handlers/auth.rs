//! Authentication request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    AuthResponse, ForgotRequest, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest,
    ResetRequest,
};
use crate::services::auth::{self, Session};
use crate::services::cookies::{self, REFRESH_COOKIE};

/// Message returned by `forgot` whether or not the account exists.
pub const FORGOT_MESSAGE: &str = "If an account exists, reset instructions were sent.";

fn with_session(state: &AppState, jar: CookieJar, session: &Session) -> CookieJar {
    cookies::with_tokens(
        jar,
        &session.tokens,
        state.tokens.access_ttl(),
        state.tokens.refresh_ttl(),
        state.config.secure_cookies,
    )
}

/// `POST /auth/register`: create an account and sign it in.
pub async fn register_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let session = auth::register(&state, body).await?;
    let jar = with_session(&state, jar, &session);
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            message: "Registered".into(),
            user: session.identity.view(),
        }),
    ))
}

/// `POST /auth/login`
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let session = auth::login(&state, &body.email, &body.password).await?;
    let jar = with_session(&state, jar, &session);
    Ok((
        jar,
        Json(AuthResponse {
            message: "Logged in".into(),
            user: session.identity.view(),
        }),
    ))
}

/// `POST /auth/refresh`: rotate the token pair.
///
/// The refresh token comes from the `refreshToken` cookie, else from an
/// optional JSON body `{refreshToken}`.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    let from_body = || {
        serde_json::from_slice::<RefreshRequest>(&body)
            .ok()
            .and_then(|r| r.refresh_token)
    };
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(from_body)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    let session = auth::refresh(&state, &token).await?;
    let jar = with_session(&state, jar, &session);
    Ok((jar, Json(MessageResponse::new("Refreshed"))))
}

/// `POST /auth/logout`: clear both cookies. Stateless: tokens already
/// handed out stay valid until they expire.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    (
        cookies::cleared(jar, state.config.secure_cookies),
        Json(MessageResponse::new("Logged out")),
    )
}

/// `POST /auth/forgot`
pub async fn forgot_handler(
    State(state): State<AppState>,
    Json(body): Json<ForgotRequest>,
) -> AppResult<Json<MessageResponse>> {
    auth::forgot(&state, &body.email).await?;
    Ok(Json(MessageResponse::new(FORGOT_MESSAGE)))
}

/// `POST /auth/reset`
pub async fn reset_handler(
    State(state): State<AppState>,
    Json(body): Json<ResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    auth::reset(&state, &body.token, &body.user_id, &body.password).await?;
    Ok(Json(MessageResponse::new("Password reset successful")))
}
