//! Register, login, refresh and password reset flows.

use chrono::Utc;
use optimus_core::auth::AuthError;
use optimus_core::models::auth::{Identity, NewIdentity, Role, TokenPair, UserId, normalize_email};
use tracing::{debug, info};

use crate::AppState;
use crate::models::RegisterRequest;

/// An authenticated identity together with its freshly issued tokens.
#[derive(Debug)]
pub struct Session {
    pub identity: Identity,
    pub tokens: TokenPair,
}

/// Create an account. Admins cannot self-register and no account joins a
/// company here; tenants are attached by onboarding outside this service.
pub async fn register(state: &AppState, req: RegisterRequest) -> Result<Session, AuthError> {
    let first_name = req.first_name.trim();
    let email = normalize_email(&req.email);
    if first_name.is_empty() || email.is_empty() || req.password.is_empty() || req.role.is_empty() {
        return Err(AuthError::Validation("Missing fields".into()));
    }
    let role: Role = req
        .role
        .parse()
        .map_err(|_| AuthError::Validation("Invalid role".into()))?;
    if role == Role::Admin {
        return Err(AuthError::Validation("Invalid role".into()));
    }

    let password_hash = state.hasher.hash(&req.password).await?;
    let identity = state
        .users
        .create(NewIdentity {
            email,
            first_name: first_name.to_string(),
            last_name: req.last_name.filter(|n| !n.trim().is_empty()),
            password_hash,
            role,
            tenant_id: None,
        })
        .await?;
    info!(user_id = %identity.id, %role, "registered");

    let tokens = state.tokens.issue_pair(&identity)?;
    Ok(Session { identity, tokens })
}

/// Check credentials and issue a token pair.
///
/// Unknown email and wrong password are indistinguishable to the caller,
/// in outcome and in hashing work.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<Session, AuthError> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::Validation("Missing fields".into()));
    }

    let Some(mut identity) = state.users.find_by_email(&email).await? else {
        state.hasher.verify_dummy(password).await?;
        debug!("login for unknown email");
        return Err(AuthError::InvalidCredentials);
    };
    if !state.hasher.verify(password, &identity.password_hash).await? {
        debug!(user_id = %identity.id, "login with wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    let now = Utc::now();
    state.users.record_login(identity.id, now).await?;
    identity.last_login_at = Some(now);
    info!(user_id = %identity.id, "logged in");

    let tokens = state.tokens.issue_pair(&identity)?;
    Ok(Session { identity, tokens })
}

/// Rotate: verify the refresh token and issue a fresh pair for its subject.
pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<Session, AuthError> {
    let user_id = state.tokens.verify_refresh_token(refresh_token)?;
    let identity = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AuthError::Unauthenticated)?;
    let tokens = state.tokens.issue_pair(&identity)?;
    debug!(user_id = %identity.id, "tokens refreshed");
    Ok(Session { identity, tokens })
}

/// Start a password reset. The outcome never depends on whether the
/// account exists, and mail delivery is not awaited.
pub async fn forgot(state: &AppState, email: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() {
        return Err(AuthError::Validation("Missing fields".into()));
    }
    // Dropping the dispatch detaches it.
    drop(state.resets.request_reset(email).await?);
    Ok(())
}

/// Consume a reset token and set the new password.
pub async fn reset(
    state: &AppState,
    token: &str,
    user_id: &str,
    password: &str,
) -> Result<(), AuthError> {
    if token.is_empty() || user_id.is_empty() || password.is_empty() {
        return Err(AuthError::Validation("Missing fields".into()));
    }
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| AuthError::InvalidOrExpiredToken)?;
    state.resets.resolve_reset(user_id, token, password).await
}
