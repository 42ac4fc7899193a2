pub mod credentials;
pub mod memory;
pub mod tokens;

pub use credentials::PostgresCredentialStore;
pub use memory::InMemoryCredentialStore;
pub use memory::InMemoryTokenStore;
pub use tokens::PostgresTokenStore;

use sqlx::PgPool;

use crate::identity::errors::StoreError;

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Map a driver error, turning unique violations into `Conflict`.
pub(crate) fn map_sqlx_error(error: sqlx::Error, what: impl Into<String>) -> StoreError {
    if let Some(db_err) = error.as_database_error() {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(what.into());
        }
    }
    StoreError::Database(error.to_string())
}
