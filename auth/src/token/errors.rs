use thiserror::Error;

use super::claims::TokenKind;

/// Error type for token issuance and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    EncodingFailed(String),

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token is expired")]
    Expired,

    #[error("Token type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: TokenKind, found: String },

    #[error("Token is malformed: {0}")]
    Malformed(String),

    #[error("No signing key configured for {0} tokens")]
    MissingKey(TokenKind),
}
