use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::FromRow;
use sqlx::PgPool;
use uuid::Uuid;

use super::map_sqlx_error;
use crate::domain::identity::models::Account;
use crate::domain::identity::models::EmailAddress;
use crate::domain::identity::models::ProviderKind;
use crate::domain::identity::models::Role;
use crate::domain::identity::models::User;
use crate::domain::identity::models::UserId;
use crate::identity::errors::StoreError;
use crate::identity::ports::CredentialStore;

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    avatar_url: Option<String>,
    email_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId(row.id),
            email: EmailAddress::new(&row.email)
                .map_err(|e| StoreError::Database(format!("stored email is invalid: {e}")))?,
            name: row.name,
            avatar_url: row.avatar_url,
            email_verified_at: row.email_verified_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AccountRow {
    id: Uuid,
    user_id: Uuid,
    provider: String,
    external_id: Option<String>,
    password_hash: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            user_id: UserId(row.user_id),
            provider: ProviderKind::from(row.provider.as_str()),
            external_id: row.external_id,
            password_hash: row.password_hash,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct RolePermissionRow {
    role: String,
    permission: Option<String>,
}

pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn find_user_by_email(&self, email: &EmailAddress) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, avatar_url, email_verified_at, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, avatar_url, email_verified_at, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .map(User::try_from)
        .transpose()
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, avatar_url, email_verified_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.0)
        .bind(user.email.as_str())
        .bind(&user.name)
        .bind(&user.avatar_url)
        .bind(user.email_verified_at)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, format!("email already registered: {}", user.email)))?;

        Ok(user)
    }

    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, name = $3, avatar_url = $4, email_verified_at = $5
            WHERE id = $1
            "#,
        )
        .bind(user.id.0)
        .bind(user.email.as_str())
        .bind(&user.name)
        .bind(&user.avatar_url)
        .bind(user.email_verified_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, format!("email already registered: {}", user.email)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", user.id)));
        }

        Ok(user)
    }

    async fn assign_default_role(&self, user_id: &UserId, role: &str) -> Result<(), StoreError> {
        let role_id: i32 = sqlx::query_scalar("SELECT id FROM roles WHERE name = $1")
            .bind(role)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(format!("role {role}")))?;

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id.0)
        .bind(role_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn load_roles(&self, user_id: &UserId) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query_as::<_, RolePermissionRow>(
            r#"
            SELECT r.name AS role, rp.permission
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name, rp.permission
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut roles: Vec<Role> = Vec::new();
        for row in rows {
            if let Some(role) = roles.last_mut().filter(|role| role.name == row.role) {
                role.permissions.extend(row.permission);
                continue;
            }
            roles.push(Role {
                name: row.role,
                permissions: row.permission.into_iter().collect(),
            });
        }

        Ok(roles)
    }

    async fn find_account(
        &self,
        user_id: &UserId,
        provider: &ProviderKind,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, user_id, provider, external_id, password_hash,
                   access_token, refresh_token, created_at, updated_at
            FROM accounts
            WHERE user_id = $1 AND provider = $2
            "#,
        )
        .bind(user_id.0)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.map(Account::from))
    }

    async fn create_account(&self, account: Account) -> Result<Account, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, provider, external_id, password_hash,
                                  access_token, refresh_token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.id)
        .bind(account.user_id.0)
        .bind(account.provider.as_str())
        .bind(&account.external_id)
        .bind(&account.password_hash)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_sqlx_error(
                e,
                format!(
                    "{} account already linked for user {}",
                    account.provider, account.user_id
                ),
            )
        })?;

        Ok(account)
    }

    async fn update_account(&self, account: Account) -> Result<Account, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET external_id = $2, password_hash = $3, access_token = $4,
                refresh_token = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.external_id)
        .bind(&account.password_hash)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("account {}", account.id)));
        }

        Ok(account)
    }
}
