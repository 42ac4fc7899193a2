use async_trait::async_trait;
use auth::TokenKind;
use chrono::DateTime;
use chrono::Utc;
use sqlx::FromRow;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::identity::models::TokenRecord;
use crate::domain::identity::models::UserId;
use crate::identity::errors::StoreError;
use crate::identity::ports::TokenStore;

#[derive(FromRow)]
struct TokenRow {
    value: String,
    kind: String,
    email: String,
    user_id: Option<Uuid>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<TokenRow> for TokenRecord {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(TokenRecord {
            kind: row.kind.parse::<TokenKind>().map_err(StoreError::Database)?,
            value: row.value,
            email: row.email,
            user_id: row.user_id.map(UserId),
            expires_at: row.expires_at,
        })
    }
}

/// Token records in PostgreSQL.
///
/// `consume` is a single `DELETE ... RETURNING`, so two concurrent
/// redemptions of the same value cannot both see the row.
pub struct PostgresTokenStore {
    pool: PgPool,
}

impl PostgresTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PostgresTokenStore {
    async fn save(&self, record: TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO token_records (value, kind, email, user_id, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (value) DO UPDATE
            SET kind = EXCLUDED.kind, email = EXCLUDED.email,
                user_id = EXCLUDED.user_id, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&record.value)
        .bind(record.kind.as_str())
        .bind(&record.email)
        .bind(record.user_id.map(|id| id.0))
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, value: &str) -> Result<Option<TokenRecord>, StoreError> {
        sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT value, kind, email, user_id, expires_at
            FROM token_records
            WHERE value = $1
            "#,
        )
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .map(TokenRecord::try_from)
        .transpose()
    }

    async fn delete(&self, value: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM token_records WHERE value = $1")
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn consume(&self, value: &str) -> Result<Option<TokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, TokenRow>(
            r#"
            DELETE FROM token_records
            WHERE value = $1
            RETURNING value, kind, email, user_id, expires_at
            "#,
        )
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .map(TokenRecord::try_from)
        .transpose()?;

        let now = Utc::now();
        Ok(record.filter(|record| !record.is_expired(now)))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM token_records WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
