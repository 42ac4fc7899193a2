use std::sync::Arc;

use async_trait::async_trait;
use auth::random;
use auth::AccessClaims;
use auth::InviteClaims;
use auth::OtpClaims;
use auth::PasswordHasher;
use auth::RefreshClaims;
use auth::StateClaims;
use auth::TokenCodec;
use auth::TokenKind;
use chrono::Duration;
use chrono::Utc;
use serde::de::DeserializeOwned;
use url::Url;

use crate::domain::identity::models::Account;
use crate::domain::identity::models::AuthTokens;
use crate::domain::identity::models::AuthenticateCommand;
use crate::domain::identity::models::EmailAddress;
use crate::domain::identity::models::Notification;
use crate::domain::identity::models::NotificationTemplate;
use crate::domain::identity::models::OAuthOutcome;
use crate::domain::identity::models::OAuthRedirect;
use crate::domain::identity::models::OtpKind;
use crate::domain::identity::models::ProviderKind;
use crate::domain::identity::models::TokenRecord;
use crate::domain::identity::models::User;
use crate::domain::identity::models::UserId;
use crate::domain::identity::models::UserInfo;
use crate::identity::errors::AuthError;
use crate::identity::errors::StoreResultExt;
use crate::identity::ports::AuthServicePort;
use crate::identity::ports::CredentialStore;
use crate::identity::ports::IdentityProviderRegistry;
use crate::identity::ports::NotificationDispatcher;
use crate::identity::ports::TokenStore;

const INVITE_PATH: &str = "auth/invite";
const FORGOT_PASSWORD_PATH: &str = "auth/forgot-password";

/// Deployment-specific values the orchestrator needs.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Confirmation links are built relative to this URL.
    pub base_url: Url,
    /// Role granted to every new user.
    pub default_role: String,
}

impl AuthSettings {
    pub fn new(base_url: Url, default_role: impl Into<String>) -> Self {
        Self {
            base_url,
            default_role: default_role.into(),
        }
    }

    fn link(&self, path: &str, token: Option<&str>) -> String {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base_path, path));
        url.set_query(None);
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        url.to_string()
    }
}

/// Authentication orchestrator.
///
/// Composes the credential and token stores, the password hasher, the token
/// codec, the identity provider registry and the notification dispatcher into
/// the sign-in, token lifecycle and email confirmation flows.
pub struct AuthService<CS, TS, ND>
where
    CS: CredentialStore,
    TS: TokenStore,
    ND: NotificationDispatcher,
{
    credentials: Arc<CS>,
    tokens: Arc<TS>,
    notifier: Arc<ND>,
    providers: IdentityProviderRegistry,
    codec: TokenCodec,
    password_hasher: PasswordHasher,
    settings: AuthSettings,
}

impl<CS, TS, ND> AuthService<CS, TS, ND>
where
    CS: CredentialStore,
    TS: TokenStore,
    ND: NotificationDispatcher,
{
    /// Create a new auth service with injected dependencies.
    pub fn new(
        credentials: Arc<CS>,
        tokens: Arc<TS>,
        notifier: Arc<ND>,
        providers: IdentityProviderRegistry,
        codec: TokenCodec,
        settings: AuthSettings,
    ) -> Self {
        Self {
            credentials,
            tokens,
            notifier,
            providers,
            codec,
            password_hasher: PasswordHasher::new(),
            settings,
        }
    }

    /// Verify a signed token as `kind`. Every failure is reported as `TokenInvalid`.
    fn decode<C: DeserializeOwned>(&self, token: &str, kind: TokenKind) -> Result<C, AuthError> {
        self.codec.parse(token, kind).map_err(|e| {
            tracing::debug!(kind = %kind, error = %e, "Token rejected");
            AuthError::TokenInvalid
        })
    }

    /// Single-use redemption: the record is removed atomically by the store.
    async fn redeem(&self, value: &str, kind: TokenKind) -> Result<TokenRecord, AuthError> {
        let record = self
            .tokens
            .consume(value)
            .await
            .context("consuming token record")?
            .ok_or_else(|| {
                tracing::debug!(kind = %kind, "Token record absent, consumed or expired");
                AuthError::TokenInvalid
            })?;

        if record.kind != kind {
            tracing::debug!(kind = %kind, stored = %record.kind, "Token record kind mismatch");
            return Err(AuthError::TokenInvalid);
        }

        Ok(record)
    }

    async fn persist(
        &self,
        value: String,
        kind: TokenKind,
        email: String,
        user_id: Option<UserId>,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let record = TokenRecord {
            value,
            kind,
            email,
            user_id,
            expires_at: Utc::now() + ttl,
        };

        self.tokens
            .save(record)
            .await
            .context("saving token record")
    }

    async fn find_user(&self, user_id: &str) -> Result<User, AuthError> {
        let user_id = UserId::from_string(user_id).map_err(|_| AuthError::TokenInvalid)?;

        self.credentials
            .find_user_by_id(&user_id)
            .await
            .context("finding user by id")?
            .ok_or(AuthError::UserNotFound)
    }

    /// Invalidate a stale local password once a provider proves ownership of
    /// the email, then mark the email verified.
    ///
    /// No-op unless the user is still unverified and this login carries a
    /// provider-verified email.
    async fn apply_self_heal(
        &self,
        user: &mut User,
        command: &AuthenticateCommand,
    ) -> Result<(), AuthError> {
        if user.is_email_verified() || !command.email_verified_by_provider() {
            return Ok(());
        }

        if !command.provider.is_credentials() {
            let credentials_account = self
                .credentials
                .find_account(&user.id, &ProviderKind::Credentials)
                .await
                .context("finding credentials account")?;

            if let Some(mut account) = credentials_account {
                let password_hash = self.password_hasher.hash(&random::random_password())?;
                account.password_hash = Some(password_hash);
                account.updated_at = Utc::now();
                self.credentials
                    .update_account(account)
                    .await
                    .context("rotating credentials password")?;

                tracing::warn!(
                    user_id = %user.id,
                    email = %user.email,
                    provider = %command.provider,
                    "Unverified local password invalidated after verified federated login"
                );

                self.notifier.dispatch(Notification {
                    template: NotificationTemplate::SecurityPasswordReset,
                    recipient: user.email.clone(),
                    user_id: Some(user.id),
                    confirmation_url: Some(self.settings.link(FORGOT_PASSWORD_PATH, None)),
                    display_code: None,
                });
            }
        }

        if let Some(verified_email) = &command.verified_email {
            user.email = verified_email.clone();
        }
        user.email_verified_at = Some(Utc::now());
        *user = self
            .credentials
            .update_user(user.clone())
            .await
            .context("marking email verified")?;

        tracing::info!(user_id = %user.id, email = %user.email, "Email verified by identity provider");

        Ok(())
    }
}

#[async_trait]
impl<CS, TS, ND> AuthServicePort for AuthService<CS, TS, ND>
where
    CS: CredentialStore,
    TS: TokenStore,
    ND: NotificationDispatcher,
{
    async fn authenticate(&self, command: AuthenticateCommand) -> Result<User, AuthError> {
        let verified_by_provider = command.email_verified_by_provider();

        let existing = self
            .credentials
            .find_user_by_email(&command.email)
            .await
            .context("finding user by email")?;

        let (mut user, is_first_login) = match existing {
            Some(user) => (user, false),
            None => {
                if command.provider.is_credentials() && command.password.is_none() {
                    return Err(AuthError::PasswordRequired);
                }

                let mut user = User::new(
                    command.email.clone(),
                    command.name.clone(),
                    command.avatar_url.clone(),
                );
                if verified_by_provider {
                    user.email_verified_at = Some(Utc::now());
                }

                let user = self
                    .credentials
                    .create_user(user)
                    .await
                    .context("creating user")?;
                self.credentials
                    .assign_default_role(&user.id, &self.settings.default_role)
                    .await
                    .context("assigning default role")?;

                tracing::info!(
                    user_id = %user.id,
                    email = %user.email,
                    provider = %command.provider,
                    verified = verified_by_provider,
                    "User created"
                );

                (user, !verified_by_provider)
            }
        };

        let account = self
            .credentials
            .find_account(&user.id, &command.provider)
            .await
            .context("finding account")?;

        let Some(account) = account else {
            let password_hash = if command.provider.is_credentials() {
                let password = command
                    .password
                    .as_deref()
                    .ok_or(AuthError::PasswordRequired)?;
                Some(self.password_hasher.hash(password)?)
            } else {
                None
            };

            let account = Account::new(
                user.id,
                command.provider.clone(),
                command.external_id.clone(),
                password_hash,
            );
            self.credentials
                .create_account(account)
                .await
                .context("creating account")?;

            tracing::info!(user_id = %user.id, provider = %command.provider, "Account linked");

            if is_first_login {
                // Best effort: the signup itself has succeeded.
                if let Err(e) = self.send_otp_email(OtpKind::Verification, &user, None).await {
                    tracing::error!(
                        user_id = %user.id,
                        email = %user.email,
                        error = %e,
                        "Failed to queue verification email"
                    );
                }
            } else if command.provider.is_credentials() && user.is_email_verified() {
                tracing::warn!(
                    user_id = %user.id,
                    email = %user.email,
                    "Local password added to a verified account"
                );
                self.notifier.dispatch(Notification {
                    template: NotificationTemplate::SecurityPasswordAdded,
                    recipient: user.email.clone(),
                    user_id: Some(user.id),
                    confirmation_url: Some(self.settings.link(FORGOT_PASSWORD_PATH, None)),
                    display_code: None,
                });
            } else {
                self.apply_self_heal(&mut user, &command).await?;
            }

            return Ok(user);
        };

        if command.provider.is_credentials() {
            let (Some(hash), Some(password)) =
                (account.password_hash.as_deref(), command.password.as_deref())
            else {
                return Err(AuthError::InvalidCredentials);
            };

            if !self.password_hasher.verify(hash, password)? {
                tracing::debug!(user_id = %user.id, "Password mismatch");
                return Err(AuthError::InvalidCredentials);
            }
        }

        self.apply_self_heal(&mut user, &command).await?;

        Ok(user)
    }

    async fn resolve_user_info(&self, user_id: &UserId) -> Result<UserInfo, AuthError> {
        let user = self
            .credentials
            .find_user_by_id(user_id)
            .await
            .context("finding user by id")?
            .ok_or(AuthError::UserNotFound)?;

        let roles = self
            .credentials
            .load_roles(user_id)
            .await
            .context("loading roles")?;

        Ok(UserInfo::new(user, roles))
    }

    async fn create_auth_tokens(&self, info: &UserInfo) -> Result<AuthTokens, AuthError> {
        let access_ttl = self.codec.ttl(TokenKind::Access)?;
        let refresh_ttl = self.codec.ttl(TokenKind::Refresh)?;
        let user = &info.user;

        let access_claims = AccessClaims::new(
            user.id,
            &user.email,
            info.roles.clone(),
            info.permissions.clone(),
            access_ttl,
        );
        let access_token = self.codec.issue(&access_claims)?;

        let value = random::opaque_token();
        let refresh_claims = RefreshClaims::new(user.id, &user.email, value.clone(), refresh_ttl);
        let refresh_token = self.codec.issue(&refresh_claims)?;

        self.persist(
            value,
            TokenKind::Refresh,
            user.email.to_string(),
            Some(user.id),
            refresh_ttl,
        )
        .await?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: access_ttl.num_seconds(),
            refresh_expires_in: refresh_ttl.num_seconds(),
        })
    }

    async fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.decode(token, TokenKind::Access)
    }

    async fn handle_refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let claims: RefreshClaims = self.decode(refresh_token, TokenKind::Refresh)?;
        self.redeem(&claims.token, TokenKind::Refresh).await?;

        let user = self.find_user(&claims.sub).await?;
        let info = self.resolve_user_info(&user.id).await?;
        let tokens = self.create_auth_tokens(&info).await?;

        tracing::info!(user_id = %user.id, "Refresh token rotated");

        Ok(tokens)
    }

    async fn signout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims: RefreshClaims = self.decode(refresh_token, TokenKind::Refresh)?;

        let removed = self
            .tokens
            .delete(&claims.token)
            .await
            .context("revoking refresh token")?;
        if !removed {
            return Err(AuthError::TokenInvalid);
        }

        tracing::info!(user_id = %claims.sub, "Refresh token revoked");

        Ok(())
    }

    async fn create_and_persist_state_token(
        &self,
        provider: &str,
        code_verifier: String,
        redirect_to: Option<String>,
    ) -> Result<String, AuthError> {
        let ttl = self.codec.ttl(TokenKind::State)?;
        let value = random::opaque_token();

        let claims = StateClaims::new(value.clone(), provider, code_verifier, redirect_to, ttl);
        let state = self.codec.issue(&claims)?;

        self.persist(value, TokenKind::State, String::new(), None, ttl)
            .await?;

        Ok(state)
    }

    async fn verify_state_token(&self, state: &str) -> Result<StateClaims, AuthError> {
        let claims: StateClaims = self.decode(state, TokenKind::State)?;
        self.redeem(&claims.token, TokenKind::State).await?;

        Ok(claims)
    }

    async fn begin_oauth(
        &self,
        provider: &str,
        redirect_to: Option<String>,
    ) -> Result<OAuthRedirect, AuthError> {
        let identity_provider = self
            .providers
            .get(provider)
            .ok_or_else(|| AuthError::ProviderDisabled(provider.to_string()))?;

        let code_verifier = random::pkce_verifier();
        let code_challenge = random::pkce_challenge(&code_verifier);

        let state = self
            .create_and_persist_state_token(identity_provider.name(), code_verifier, redirect_to)
            .await?;
        let url = identity_provider.build_auth_url(&state, Some(&code_challenge))?;

        Ok(OAuthRedirect { url, state })
    }

    async fn complete_oauth(&self, state: &str, code: &str) -> Result<OAuthOutcome, AuthError> {
        let claims = self.verify_state_token(state).await?;

        let identity_provider = self
            .providers
            .get(&claims.provider)
            .ok_or_else(|| AuthError::ProviderDisabled(claims.provider.clone()))?;

        let provider_token = identity_provider
            .exchange_code(code, Some(&claims.code_verifier))
            .await?;
        let profile = identity_provider.fetch_profile(&provider_token).await?;

        let email = profile
            .email
            .clone()
            .ok_or(AuthError::UnverifiedProviderEmail)?;
        let command = AuthenticateCommand::federated(identity_provider.name(), email, profile);
        let provider_kind = command.provider.clone();

        let user = self.authenticate(command).await?;

        let account = self
            .credentials
            .find_account(&user.id, &provider_kind)
            .await
            .context("finding federated account")?;
        if let Some(mut account) = account {
            account.access_token = Some(provider_token.access_token);
            if provider_token.refresh_token.is_some() {
                account.refresh_token = provider_token.refresh_token;
            }
            account.updated_at = Utc::now();
            self.credentials
                .update_account(account)
                .await
                .context("caching provider tokens")?;
        }

        Ok(OAuthOutcome {
            user,
            redirect_to: claims.redirect_to,
        })
    }

    async fn send_otp_email(
        &self,
        kind: OtpKind,
        user: &User,
        redirect_to: Option<String>,
    ) -> Result<(), AuthError> {
        let token_kind = kind.token_kind();
        let ttl = self.codec.ttl(token_kind)?;
        let value = random::opaque_token();
        let code = random::numeric_code(random::OTP_CODE_LENGTH);

        let claims = OtpClaims::new(
            token_kind,
            user.id,
            &user.email,
            value.clone(),
            code.clone(),
            redirect_to,
            ttl,
        );
        let token = self.codec.issue(&claims)?;

        self.persist(value, token_kind, user.email.to_string(), Some(user.id), ttl)
            .await?;

        self.notifier.dispatch(Notification {
            template: kind.template(),
            recipient: user.email.clone(),
            user_id: Some(user.id),
            confirmation_url: Some(self.settings.link(kind.confirmation_path(), Some(&token))),
            display_code: Some(code),
        });

        tracing::debug!(user_id = %user.id, kind = %token_kind, "One-time token issued");

        Ok(())
    }

    async fn request_password_reset(
        &self,
        email: &EmailAddress,
        redirect_to: Option<String>,
    ) -> Result<(), AuthError> {
        let Some(user) = self
            .credentials
            .find_user_by_email(email)
            .await
            .context("finding user by email")?
        else {
            tracing::debug!(email = %email, "Password reset requested for unknown email");
            return Ok(());
        };

        let account = self
            .credentials
            .find_account(&user.id, &ProviderKind::Credentials)
            .await
            .context("finding credentials account")?;
        if account.is_none() {
            tracing::debug!(user_id = %user.id, "Password reset requested without credentials account");
            return Ok(());
        }

        self.send_otp_email(OtpKind::PasswordReset, &user, redirect_to)
            .await
    }

    async fn handle_verification_token(&self, token: &str) -> Result<User, AuthError> {
        let claims: OtpClaims = self.decode(token, TokenKind::Verification)?;
        self.redeem(&claims.token, TokenKind::Verification).await?;

        let mut user = self.find_user(&claims.sub).await?;
        if user.is_email_verified() {
            return Err(AuthError::AlreadyVerified);
        }

        user.email_verified_at = Some(Utc::now());
        let user = self
            .credentials
            .update_user(user)
            .await
            .context("marking email verified")?;

        tracing::info!(user_id = %user.id, email = %user.email, "Email verified");

        Ok(user)
    }

    async fn handle_password_reset_token(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let claims: OtpClaims = self.decode(token, TokenKind::PasswordReset)?;
        self.redeem(&claims.token, TokenKind::PasswordReset).await?;

        let user = self.find_user(&claims.sub).await?;
        let mut account = self
            .credentials
            .find_account(&user.id, &ProviderKind::Credentials)
            .await
            .context("finding credentials account")?
            .ok_or(AuthError::AccountNotFound)?;

        account.password_hash = Some(self.password_hasher.hash(new_password)?);
        account.updated_at = Utc::now();
        self.credentials
            .update_account(account)
            .await
            .context("updating password")?;

        tracing::info!(user_id = %user.id, "Password reset");

        Ok(())
    }

    async fn send_invite(
        &self,
        email: &EmailAddress,
        redirect_to: Option<String>,
    ) -> Result<(), AuthError> {
        let ttl = self.codec.ttl(TokenKind::Invite)?;
        let value = random::opaque_token();

        let claims = InviteClaims::new(email, value.clone(), redirect_to, ttl);
        let token = self.codec.issue(&claims)?;

        self.persist(value, TokenKind::Invite, email.to_string(), None, ttl)
            .await?;

        self.notifier.dispatch(Notification {
            template: NotificationTemplate::Invite,
            recipient: email.clone(),
            user_id: None,
            confirmation_url: Some(self.settings.link(INVITE_PATH, Some(&token))),
            display_code: None,
        });

        Ok(())
    }

    async fn redeem_invite(&self, token: &str) -> Result<InviteClaims, AuthError> {
        let claims: InviteClaims = self.decode(token, TokenKind::Invite)?;
        self.redeem(&claims.token, TokenKind::Invite).await?;

        Ok(claims)
    }
}
