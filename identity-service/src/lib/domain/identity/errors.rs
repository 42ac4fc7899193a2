use auth::PasswordError;
use auth::TokenError;
use thiserror::Error;

/// Error for UserId parsing failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserIdError {
    #[error("Invalid UUID format: {0}")]
    InvalidFormat(String),
}

/// Error for EmailAddress validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("Invalid email format: {0}")]
    InvalidFormat(String),
}

/// Error returned by credential and token store adapters
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Error returned by identity provider adapters
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Invalid provider configuration: {0}")]
    Configuration(String),

    #[error("Authorization code exchange failed: {0}")]
    Exchange(String),

    #[error("Profile request failed: {0}")]
    Profile(String),
}

/// Error returned by mail delivery adapters
#[derive(Debug, Clone, Error)]
pub enum MailerError {
    #[error("Failed to serialize message: {0}")]
    SerializationFailed(String),

    #[error("Failed to deliver message: {0}")]
    DeliveryFailed(String),
}

/// Top-level error for all authentication operations
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("A password is required")]
    PasswordRequired,

    /// Bad signature, wrong type, expired, or already consumed/revoked.
    #[error("Invalid or expired token")]
    TokenInvalid,

    #[error("Email is already verified")]
    AlreadyVerified,

    #[error("Account not found")]
    AccountNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Identity provider is not enabled: {0}")]
    ProviderDisabled(String),

    #[error("Identity provider exchange failed: {0}")]
    ProviderExchangeFailed(#[from] ProviderError),

    #[error("Identity provider did not report a verified email")]
    UnverifiedProviderEmail,

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    /// Token signing failed. Parse failures never surface as this variant.
    #[error("Token error: {0}")]
    Codec(#[from] TokenError),

    #[error("{context}: {source}")]
    Upstream {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl AuthError {
    /// Message safe to show to an unauthenticated caller.
    ///
    /// Never distinguishes a missing user from a wrong password, nor one
    /// token failure from another.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials | AuthError::UserNotFound | AuthError::AccountNotFound => {
                "Invalid credentials"
            }
            AuthError::TokenInvalid => "Invalid or expired token",
            AuthError::PasswordRequired => "A password is required",
            AuthError::AlreadyVerified => "Email is already verified",
            AuthError::InvalidEmail(_) => "Invalid email address",
            AuthError::ProviderDisabled(_) => "Identity provider is not available",
            AuthError::ProviderExchangeFailed(_) | AuthError::UnverifiedProviderEmail => {
                "Could not sign in with the identity provider"
            }
            AuthError::Password(_) | AuthError::Codec(_) | AuthError::Upstream { .. } => {
                "Internal error"
            }
        }
    }
}

/// Attach calling context to store failures.
pub trait StoreResultExt<T> {
    fn context(self, context: &'static str) -> Result<T, AuthError>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn context(self, context: &'static str) -> Result<T, AuthError> {
        self.map_err(|source| AuthError::Upstream { context, source })
    }
}
