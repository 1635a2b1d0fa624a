//! Tenant scope middleware. Runs after [`super::auth::require_auth`].

use axum::{extract::Request, middleware::Next, response::Response};
use optimus_core::models::auth::Role;
use optimus_core::tenant::{TENANT_HEADER, resolve_tenant_context};

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;

/// Resolve the caller's [`TenantContext`](optimus_core::tenant::TenantContext)
/// and store it in request extensions.
pub async fn tenant_scope(mut request: Request, next: Next) -> Result<Response, AppError> {
    let AuthenticatedUser(claims) = request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    // Only Admins may elevate; everyone else's header is ignored outright.
    let elevation = request
        .headers()
        .get(TENANT_HEADER)
        .filter(|_| claims.role == Role::Admin)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::Validation(format!("invalid {TENANT_HEADER}")))
        })
        .transpose()?;

    let context = resolve_tenant_context(claims.role, claims.tenant_id, elevation)?;
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}
