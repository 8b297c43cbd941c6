use sqlx::PgPool;

use crate::types::Role;

/// Resolve an access token to its role; `None` means the token is unknown
pub async fn role_for(pool: &PgPool, token: &str) -> Result<Option<Role>, sqlx::Error> {
    let row: Option<(bool,)> = sqlx::query_as("SELECT is_admin FROM users WHERE token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(is_admin,)| if is_admin { Role::Admin } else { Role::User }))
}
