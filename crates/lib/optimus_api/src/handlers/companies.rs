//! Tenant-scoped resources.

use axum::extract::Path;
use axum::{Extension, Json};
use optimus_core::models::auth::TenantId;
use optimus_core::tenant::TenantContext;

use crate::error::{AppError, AppResult};
use crate::models::ScopeResponse;

/// `GET /companies/{company_id}/scope`: the caller's tenant context, if it
/// may act on that company.
pub async fn scope_handler(
    Extension(context): Extension<TenantContext>,
    Path(company_id): Path<String>,
) -> AppResult<Json<ScopeResponse>> {
    let company: TenantId = company_id
        .parse()
        .map_err(|_| AppError::Validation("Invalid companyId".into()))?;
    context.authorize_resource(company)?;
    Ok(Json(ScopeResponse {
        company_id: context.tenant_id,
        acting_role: context.acting_role,
        global: context.is_global(),
    }))
}
