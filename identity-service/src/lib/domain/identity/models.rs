use std::fmt;
use std::str::FromStr;

use auth::TokenKind;
use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use crate::identity::errors::EmailError;
use crate::identity::errors::UserIdError;

/// Identity record.
///
/// Created on the first successful authentication of any kind. Never
/// hard-deleted by the auth flows.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: EmailAddress,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: EmailAddress, name: Option<String>, avatar_url: Option<String>) -> Self {
        Self {
            id: UserId::new(),
            email,
            name,
            avatar_url,
            email_verified_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

/// User unique identifier type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a new random user ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a user ID from string.
    ///
    /// # Errors
    /// * `InvalidFormat` - String is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self, UserIdError> {
        Uuid::parse_str(s)
            .map(UserId)
            .map_err(|e| UserIdError::InvalidFormat(e.to_string()))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Email address type
///
/// Trimmed and lower-cased before RFC 5322 validation, so lookups by email
/// are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new normalized, validated email address.
    ///
    /// # Errors
    /// * `InvalidFormat` - Email does not conform to RFC 5322
    pub fn new(email: impl AsRef<str>) -> Result<Self, EmailError> {
        let normalized = email.as_ref().trim().to_lowercase();
        email_address::EmailAddress::from_str(&normalized)
            .map(|_| EmailAddress(normalized))
            .map_err(|e| EmailError::InvalidFormat(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How an account proves identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Local email + password.
    Credentials,
    /// Federated OAuth2 provider, by registry name (`google`, `github`, ...).
    Federated(String),
}

impl ProviderKind {
    pub const CREDENTIALS: &'static str = "credentials";

    pub fn as_str(&self) -> &str {
        match self {
            ProviderKind::Credentials => Self::CREDENTIALS,
            ProviderKind::Federated(name) => name,
        }
    }

    pub fn is_credentials(&self) -> bool {
        matches!(self, ProviderKind::Credentials)
    }
}

impl From<&str> for ProviderKind {
    fn from(value: &str) -> Self {
        if value == Self::CREDENTIALS {
            ProviderKind::Credentials
        } else {
            ProviderKind::Federated(value.to_string())
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linked credential. At most one per (user, provider).
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub user_id: UserId,
    pub provider: ProviderKind,
    pub external_id: Option<String>,
    /// Set only for `credentials` accounts.
    pub password_hash: Option<String>,
    /// Cached provider tokens, federated accounts only.
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        user_id: UserId,
        provider: ProviderKind,
        external_id: Option<String>,
        password_hash: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider,
            external_id,
            password_hash,
            access_token: None,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<String>,
}

/// A user together with the authorization data embedded in access tokens.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub user: User,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl UserInfo {
    /// Flatten roles into role names and a de-duplicated permission list.
    pub fn new(user: User, roles: Vec<Role>) -> Self {
        let mut permissions: Vec<String> = roles
            .iter()
            .flat_map(|role| role.permissions.iter().cloned())
            .collect();
        permissions.sort();
        permissions.dedup();

        Self {
            user,
            roles: roles.into_iter().map(|role| role.name).collect(),
            permissions,
        }
    }
}

/// Input to sign-in / sign-up.
#[derive(Debug, Clone)]
pub struct AuthenticateCommand {
    pub email: EmailAddress,
    pub provider: ProviderKind,
    pub password: Option<String>,
    pub external_id: Option<String>,
    /// Email the provider explicitly reported as verified.
    pub verified_email: Option<EmailAddress>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl AuthenticateCommand {
    /// Email + password sign-in or sign-up.
    pub fn credentials(email: EmailAddress, password: impl Into<String>) -> Self {
        Self {
            email,
            provider: ProviderKind::Credentials,
            password: Some(password.into()),
            external_id: None,
            verified_email: None,
            name: None,
            avatar_url: None,
        }
    }

    /// Federated sign-in from a normalized provider profile whose email was verified.
    pub fn federated(provider: impl Into<String>, email: EmailAddress, profile: ProviderProfile) -> Self {
        Self {
            verified_email: profile.email.clone(),
            email,
            provider: ProviderKind::Federated(provider.into()),
            password: None,
            external_id: Some(profile.external_id),
            name: profile.name,
            avatar_url: profile.avatar_url,
        }
    }

    /// Whether the provider vouched for exactly the email being signed in.
    pub fn email_verified_by_provider(&self) -> bool {
        self.verified_email.as_ref() == Some(&self.email)
    }
}

/// Signed token pair returned after sign-in or rotation.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

/// Server-side record backing every token kind except `access`.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub value: String,
    pub kind: TokenKind,
    pub email: String,
    pub user_id: Option<UserId>,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One-time-code flows delivered by email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpKind {
    Verification,
    PasswordReset,
}

impl OtpKind {
    pub fn token_kind(&self) -> TokenKind {
        match self {
            OtpKind::Verification => TokenKind::Verification,
            OtpKind::PasswordReset => TokenKind::PasswordReset,
        }
    }

    pub fn template(&self) -> NotificationTemplate {
        match self {
            OtpKind::Verification => NotificationTemplate::EmailVerification,
            OtpKind::PasswordReset => NotificationTemplate::PasswordReset,
        }
    }

    /// Path of the confirmation page, relative to the application base URL.
    pub fn confirmation_path(&self) -> &'static str {
        match self {
            OtpKind::Verification => "auth/verify",
            OtpKind::PasswordReset => "auth/reset-password",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTemplate {
    EmailVerification,
    PasswordReset,
    SecurityPasswordReset,
    /// A local password was added to an account whose email is already verified.
    SecurityPasswordAdded,
    Invite,
}

impl NotificationTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationTemplate::EmailVerification => "email_verification",
            NotificationTemplate::PasswordReset => "password_reset",
            NotificationTemplate::SecurityPasswordReset => "security_password_reset",
            NotificationTemplate::SecurityPasswordAdded => "security_password_added",
            NotificationTemplate::Invite => "invite",
        }
    }
}

/// Outbound message handed to the notification dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub template: NotificationTemplate,
    pub recipient: EmailAddress,
    pub user_id: Option<UserId>,
    pub confirmation_url: Option<String>,
    pub display_code: Option<String>,
}

/// Provider-issued credentials from an authorization code exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// Normalized provider profile.
///
/// `email` is populated only when the provider explicitly reported it as
/// verified.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    pub external_id: String,
    pub email: Option<EmailAddress>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Where to send the browser to start an OAuth login.
#[derive(Debug, Clone)]
pub struct OAuthRedirect {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct OAuthOutcome {
    pub user: User,
    pub redirect_to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_normalized() {
        let email = EmailAddress::new("  Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
    }

    #[test]
    fn test_email_rejects_invalid() {
        assert!(EmailAddress::new("not-an-email").is_err());
        assert!(EmailAddress::new("").is_err());
    }

    #[test]
    fn test_provider_kind_round_trip() {
        assert_eq!(ProviderKind::from("credentials"), ProviderKind::Credentials);
        assert_eq!(
            ProviderKind::from("google"),
            ProviderKind::Federated("google".to_string())
        );
        assert_eq!(ProviderKind::Federated("github".into()).as_str(), "github");
    }

    #[test]
    fn test_user_info_flattens_permissions() {
        let user = User::new(EmailAddress::new("a@example.com").unwrap(), None, None);
        let info = UserInfo::new(
            user,
            vec![
                Role {
                    name: "basic".into(),
                    permissions: vec!["profile:read".into(), "profile:write".into()],
                },
                Role {
                    name: "editor".into(),
                    permissions: vec!["profile:read".into(), "posts:write".into()],
                },
            ],
        );

        assert_eq!(info.roles, vec!["basic", "editor"]);
        assert_eq!(
            info.permissions,
            vec!["posts:write", "profile:read", "profile:write"]
        );
    }

    #[test]
    fn test_email_verified_by_provider_requires_same_address() {
        let profile = ProviderProfile {
            external_id: "42".into(),
            email: Some(EmailAddress::new("other@example.com").unwrap()),
            name: None,
            avatar_url: None,
        };
        let command = AuthenticateCommand::federated(
            "google",
            EmailAddress::new("alice@example.com").unwrap(),
            profile,
        );

        assert!(!command.email_verified_by_provider());
    }
}
