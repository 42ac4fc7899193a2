//! In-memory store adapters.
//!
//! Used by the test suites and by single-node deployments that can afford to
//! lose sessions on restart. Token consumption relies on `DashMap::remove`,
//! which takes the shard lock, so at most one concurrent caller receives a
//! given record.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::identity::models::Account;
use crate::domain::identity::models::EmailAddress;
use crate::domain::identity::models::ProviderKind;
use crate::domain::identity::models::Role;
use crate::domain::identity::models::TokenRecord;
use crate::domain::identity::models::User;
use crate::domain::identity::models::UserId;
use crate::identity::errors::StoreError;
use crate::identity::ports::CredentialStore;
use crate::identity::ports::TokenStore;

#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: DashMap<UserId, User>,
    emails: DashMap<String, UserId>,
    accounts: DashMap<(UserId, String), Account>,
    role_permissions: DashMap<String, Vec<String>>,
    user_roles: DashMap<UserId, Vec<String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a role and its permissions.
    pub fn with_role(self, name: &str, permissions: &[&str]) -> Self {
        self.role_permissions.insert(
            name.to_string(),
            permissions.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user_by_email(&self, email: &EmailAddress) -> Result<Option<User>, StoreError> {
        let Some(user_id) = self.emails.get(email.as_str()).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|user| user.clone()))
    }

    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|user| user.clone()))
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        match self.emails.entry(user.email.as_str().to_string()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "email already registered: {}",
                user.email
            ))),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }

    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        let Some(previous_email) = self.users.get(&user.id).map(|stored| stored.email.clone())
        else {
            return Err(StoreError::NotFound(format!("user {}", user.id)));
        };

        if previous_email != user.email {
            match self.emails.entry(user.email.as_str().to_string()) {
                Entry::Occupied(slot) if *slot.get() != user.id => {
                    return Err(StoreError::Conflict(format!(
                        "email already registered: {}",
                        user.email
                    )));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(user.id);
                }
            }
            self.emails.remove(previous_email.as_str());
        }

        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn assign_default_role(&self, user_id: &UserId, role: &str) -> Result<(), StoreError> {
        if !self.role_permissions.contains_key(role) {
            return Err(StoreError::NotFound(format!("role {role}")));
        }

        let mut roles = self.user_roles.entry(*user_id).or_default();
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
        Ok(())
    }

    async fn load_roles(&self, user_id: &UserId) -> Result<Vec<Role>, StoreError> {
        let names = self
            .user_roles
            .get(user_id)
            .map(|roles| roles.clone())
            .unwrap_or_default();

        Ok(names
            .into_iter()
            .map(|name| Role {
                permissions: self
                    .role_permissions
                    .get(&name)
                    .map(|p| p.clone())
                    .unwrap_or_default(),
                name,
            })
            .collect())
    }

    async fn find_account(
        &self,
        user_id: &UserId,
        provider: &ProviderKind,
    ) -> Result<Option<Account>, StoreError> {
        let key = (*user_id, provider.as_str().to_string());
        Ok(self.accounts.get(&key).map(|account| account.clone()))
    }

    async fn create_account(&self, account: Account) -> Result<Account, StoreError> {
        let key = (account.user_id, account.provider.as_str().to_string());
        match self.accounts.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "{} account already linked for user {}",
                account.provider, account.user_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    async fn update_account(&self, account: Account) -> Result<Account, StoreError> {
        let key = (account.user_id, account.provider.as_str().to_string());
        let mut stored = self
            .accounts
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", account.id)))?;
        *stored = account.clone();
        Ok(account)
    }
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    records: DashMap<String, TokenRecord>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn save(&self, record: TokenRecord) -> Result<(), StoreError> {
        self.records.insert(record.value.clone(), record);
        Ok(())
    }

    async fn get(&self, value: &str) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self.records.get(value).map(|record| record.clone()))
    }

    async fn delete(&self, value: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(value).is_some())
    }

    async fn consume(&self, value: &str) -> Result<Option<TokenRecord>, StoreError> {
        let now = Utc::now();
        Ok(self
            .records
            .remove(value)
            .map(|(_, record)| record)
            .filter(|record| !record.is_expired(now)))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let removed = expired
            .iter()
            .filter(|value| {
                self.records
                    .remove_if(value.as_str(), |_, record| record.is_expired(now))
                    .is_some()
            })
            .count();

        Ok(removed as u64)
    }
}
