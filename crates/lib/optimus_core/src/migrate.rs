//! Schema migrations, embedded from `optimus_core/migrations/`.

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};

/// Embedded migrator.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Bring the schema up to date.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_schema_is_embedded() {
        assert!(
            MIGRATOR
                .iter()
                .any(|m| m.description.contains("auth") && m.sql.contains("password_reset_tokens"))
        );
    }
}
