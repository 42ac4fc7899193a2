use thiserror::Error;

/// Error type for password operations.
#[derive(Debug, Clone, Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    /// Raised only for malformed stored hashes; a mismatch is `Ok(false)`.
    #[error("Password verification failed: {0}")]
    VerificationFailed(String),
}
