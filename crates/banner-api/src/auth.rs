use axum::http::HeaderMap;
use banner_db::{PgPool, Role};

use crate::error::AppError;

/// Access level an endpoint demands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

/// Role/permission gate: admins read and write, plain users only read
pub fn allows(role: Role, permission: Permission) -> bool {
    match role {
        Role::Admin => true,
        Role::User => permission == Permission::Read,
    }
}

/// Resolve the `token` request header and require a permission.
///
/// A missing or empty token is 401; an unknown token or one whose role lacks
/// the permission is 403.
pub async fn require_permission(
    pool: &PgPool,
    headers: &HeaderMap,
    permission: Permission,
) -> Result<Role, AppError> {
    let token = headers
        .get("token")
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;

    let role = banner_db::tokens::role_for(pool, token)
        .await?
        .ok_or_else(|| AppError::Forbidden("Access denied".into()))?;

    if !allows(role, permission) {
        return Err(AppError::Forbidden("Access denied".into()));
    }

    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_reads_and_writes() {
        assert!(allows(Role::Admin, Permission::Read));
        assert!(allows(Role::Admin, Permission::Write));
    }

    #[test]
    fn user_only_reads() {
        assert!(allows(Role::User, Permission::Read));
        assert!(!allows(Role::User, Permission::Write));
    }
}
