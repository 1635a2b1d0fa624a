//! Tenant scoping.
//!
//! Derives the [`TenantContext`] a request acts under. The guard only
//! establishes context; handlers of tenant-owned resources must still call
//! [`TenantContext::authorize_resource`] against the resource's tenant.

use serde::Serialize;

use crate::auth::AuthError;
use crate::models::auth::{Role, TenantId};

/// Header through which an Admin may choose the tenant to act on.
pub const TENANT_HEADER: &str = "x-company-id";

/// Per-request authorization context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    /// `None` only for an Admin acting in global scope.
    #[serde(rename = "companyId")]
    pub tenant_id: Option<TenantId>,
    pub acting_role: Role,
}

impl TenantContext {
    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }

    /// Check that this context may touch a resource owned by
    /// `resource_tenant`. Global-scope Admins pass; everyone else must match.
    pub fn authorize_resource(&self, resource_tenant: TenantId) -> Result<(), AuthError> {
        match (self.acting_role, self.tenant_id) {
            (Role::Admin, None) => Ok(()),
            (_, Some(tenant)) if tenant == resource_tenant => Ok(()),
            _ => Err(AuthError::Forbidden),
        }
    }
}

/// Compute the tenant context for an authenticated identity.
///
/// `elevation` is the raw `x-company-id` header value; it is only honoured
/// for Admins, and only when the Admin has no tenant of their own.
pub fn resolve_tenant_context(
    role: Role,
    identity_tenant: Option<TenantId>,
    elevation: Option<&str>,
) -> Result<TenantContext, AuthError> {
    let tenant_id = match role {
        Role::Admin => match identity_tenant {
            Some(tenant) => Some(tenant),
            None => elevation
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| {
                    v.parse::<TenantId>()
                        .map_err(|_| AuthError::Validation(format!("invalid {TENANT_HEADER}")))
                })
                .transpose()?,
        },
        Role::Employer | Role::Applicant => Some(identity_tenant.ok_or(AuthError::TenantRequired)?),
    };
    Ok(TenantContext {
        tenant_id,
        acting_role: role,
    })
}
