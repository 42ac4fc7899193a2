use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use auth::AccessClaims;
use auth::InviteClaims;
use auth::StateClaims;
use chrono::DateTime;
use chrono::Utc;

use crate::domain::identity::models::Account;
use crate::domain::identity::models::AuthTokens;
use crate::domain::identity::models::AuthenticateCommand;
use crate::domain::identity::models::EmailAddress;
use crate::domain::identity::models::Notification;
use crate::domain::identity::models::OAuthOutcome;
use crate::domain::identity::models::OAuthRedirect;
use crate::domain::identity::models::OtpKind;
use crate::domain::identity::models::ProviderKind;
use crate::domain::identity::models::ProviderProfile;
use crate::domain::identity::models::ProviderToken;
use crate::domain::identity::models::Role;
use crate::domain::identity::models::TokenRecord;
use crate::domain::identity::models::User;
use crate::domain::identity::models::UserId;
use crate::domain::identity::models::UserInfo;
use crate::identity::errors::AuthError;
use crate::identity::errors::MailerError;
use crate::identity::errors::ProviderError;
use crate::identity::errors::StoreError;

/// Port for the authentication orchestrator.
#[async_trait]
pub trait AuthServicePort: Send + Sync + 'static {
    /// Sign in, or sign up on first contact.
    ///
    /// Creates the user and the provider account as needed, verifies the
    /// password for existing `credentials` accounts, and applies the
    /// self-heal policy when a provider newly vouches for an unverified email.
    ///
    /// # Errors
    /// * `PasswordRequired` - New `credentials` account without a password
    /// * `InvalidCredentials` - Wrong or missing password for an existing account
    /// * `Upstream` - Store operation failed
    async fn authenticate(&self, command: AuthenticateCommand) -> Result<User, AuthError>;

    /// Load a user with the roles and permissions to embed in access tokens.
    ///
    /// # Errors
    /// * `UserNotFound` - No user with this id
    async fn resolve_user_info(&self, user_id: &UserId) -> Result<UserInfo, AuthError>;

    /// Mint a stateless access token and a persisted refresh token.
    async fn create_auth_tokens(&self, info: &UserInfo) -> Result<AuthTokens, AuthError>;

    /// Verify an access token by signature, type and expiry only.
    ///
    /// # Errors
    /// * `TokenInvalid` - Any verification failure
    async fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AuthError>;

    /// Consume a refresh token and issue a brand-new pair.
    ///
    /// # Errors
    /// * `TokenInvalid` - Bad token, or already used, expired or revoked
    /// * `UserNotFound` - The owning user no longer exists
    async fn handle_refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, AuthError>;

    /// Revoke a refresh token.
    ///
    /// # Errors
    /// * `TokenInvalid` - Bad token, or no longer stored
    async fn signout(&self, refresh_token: &str) -> Result<(), AuthError>;

    /// Mint and persist an OAuth state token carrying the PKCE verifier.
    async fn create_and_persist_state_token(
        &self,
        provider: &str,
        code_verifier: String,
        redirect_to: Option<String>,
    ) -> Result<String, AuthError>;

    /// Parse and consume an OAuth state token.
    ///
    /// # Errors
    /// * `TokenInvalid` - Bad token, or already consumed
    async fn verify_state_token(&self, state: &str) -> Result<StateClaims, AuthError>;

    /// Start a federated login: state token plus provider authorization URL.
    ///
    /// # Errors
    /// * `ProviderDisabled` - Provider is not registered
    async fn begin_oauth(
        &self,
        provider: &str,
        redirect_to: Option<String>,
    ) -> Result<OAuthRedirect, AuthError>;

    /// Finish a federated login from the provider callback.
    ///
    /// # Errors
    /// * `TokenInvalid` - State token invalid or already used
    /// * `ProviderDisabled` - Provider named in the state is not registered
    /// * `ProviderExchangeFailed` - Code exchange or profile fetch failed
    /// * `UnverifiedProviderEmail` - Provider did not vouch for any email
    async fn complete_oauth(&self, state: &str, code: &str) -> Result<OAuthOutcome, AuthError>;

    /// Mint and persist a one-time token, then dispatch the email in the background.
    async fn send_otp_email(
        &self,
        kind: OtpKind,
        user: &User,
        redirect_to: Option<String>,
    ) -> Result<(), AuthError>;

    /// Send a reset email when a `credentials` account exists; silently succeed otherwise.
    async fn request_password_reset(
        &self,
        email: &EmailAddress,
        redirect_to: Option<String>,
    ) -> Result<(), AuthError>;

    /// Consume a verification token and mark the email verified.
    ///
    /// # Errors
    /// * `TokenInvalid` - Bad token, or already consumed
    /// * `UserNotFound` - Owning user no longer exists
    /// * `AlreadyVerified` - Email was verified in the meantime
    async fn handle_verification_token(&self, token: &str) -> Result<User, AuthError>;

    /// Consume a password reset token and store the new password.
    ///
    /// # Errors
    /// * `TokenInvalid` - Bad token, or already consumed
    /// * `UserNotFound` - Owning user no longer exists
    /// * `AccountNotFound` - User has no `credentials` account
    async fn handle_password_reset_token(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;

    /// Mint and persist an invite token, then dispatch the invite in the background.
    async fn send_invite(
        &self,
        email: &EmailAddress,
        redirect_to: Option<String>,
    ) -> Result<(), AuthError>;

    /// Consume an invite token.
    ///
    /// # Errors
    /// * `TokenInvalid` - Bad token, or already consumed
    async fn redeem_invite(&self, token: &str) -> Result<InviteClaims, AuthError>;
}

/// Persistence for users, their roles and linked accounts.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn find_user_by_email(&self, email: &EmailAddress) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    /// # Errors
    /// * `Conflict` - Email is already registered
    async fn create_user(&self, user: User) -> Result<User, StoreError>;

    /// # Errors
    /// * `NotFound` - User does not exist
    async fn update_user(&self, user: User) -> Result<User, StoreError>;

    /// Grant `role` to the user. Granting a role twice is a no-op.
    async fn assign_default_role(&self, user_id: &UserId, role: &str) -> Result<(), StoreError>;

    /// Roles granted to the user, each with its permission names.
    async fn load_roles(&self, user_id: &UserId) -> Result<Vec<Role>, StoreError>;

    async fn find_account(
        &self,
        user_id: &UserId,
        provider: &ProviderKind,
    ) -> Result<Option<Account>, StoreError>;

    /// # Errors
    /// * `Conflict` - The user already has an account for this provider
    async fn create_account(&self, account: Account) -> Result<Account, StoreError>;

    /// # Errors
    /// * `NotFound` - Account does not exist
    async fn update_account(&self, account: Account) -> Result<Account, StoreError>;
}

/// Persistence for single-use and revocable token records.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    async fn save(&self, record: TokenRecord) -> Result<(), StoreError>;

    async fn get(&self, value: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Remove a record. Returns whether a record was removed.
    async fn delete(&self, value: &str) -> Result<bool, StoreError>;

    /// Atomically look up and remove a record.
    ///
    /// Concurrent calls with the same value yield the record to at most one
    /// caller; all others observe `None`. Records past their expiry are
    /// removed and reported as `None`.
    async fn consume(&self, value: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Remove every record that expired at or before `now`. Returns the count removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// A federated OAuth2 identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Registry name, also stored as the account provider kind.
    fn name(&self) -> &str;

    fn build_auth_url(&self, state: &str, pkce_challenge: Option<&str>)
        -> Result<String, ProviderError>;

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<ProviderToken, ProviderError>;

    /// Fetch and normalize the profile. Unverified emails are discarded.
    async fn fetch_profile(&self, token: &ProviderToken) -> Result<ProviderProfile, ProviderError>;
}

/// Enabled identity providers, by name.
#[derive(Clone, Default)]
pub struct IdentityProviderRegistry {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl IdentityProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Fire-and-forget outbound notifications.
///
/// `dispatch` must return without waiting for delivery, and delivery
/// failures never reach the caller.
pub trait NotificationDispatcher: Send + Sync + 'static {
    fn dispatch(&self, notification: Notification);
}

/// Delivers a single notification. Driven by the background dispatcher.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn deliver(&self, notification: &Notification) -> Result<(), MailerError>;
}
