//! Authentication primitives library
//!
//! Provides the service-agnostic building blocks of the identity core:
//! - Password hashing (Argon2id)
//! - Typed, per-kind signed tokens (HS256 JWT with a mandatory `type` claim)
//! - Secure random material (opaque token values, OTP codes, PKCE)
//!
//! Persistence, identity providers and the sign-in state machine live in the
//! service crate and consume these primitives.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::new();
//! let hash = hasher.hash("my_password").unwrap();
//! assert!(hasher.verify(&hash, "my_password").unwrap());
//! assert!(!hasher.verify(&hash, "not_my_password").unwrap());
//! ```
//!
//! ## Typed Tokens
//! ```
//! use auth::{AccessClaims, TokenCodec, TokenKeys, TokenKind};
//! use chrono::Duration;
//!
//! let codec = TokenCodec::new(
//!     TokenKeys::new().with(TokenKind::Access, b"access_secret_at_least_32_bytes!", Duration::minutes(15)),
//! );
//! let claims = AccessClaims::new("user123", "alice@example.com", vec![], vec![], Duration::minutes(15));
//! let token = codec.issue(&claims).unwrap();
//! let decoded: AccessClaims = codec.parse(&token, TokenKind::Access).unwrap();
//! assert_eq!(decoded.sub, "user123");
//! ```

pub mod password;
pub mod random;
pub mod token;

// Re-export commonly used items
pub use password::PasswordError;
pub use password::PasswordHasher;
pub use token::AccessClaims;
pub use token::InviteClaims;
pub use token::OtpClaims;
pub use token::RefreshClaims;
pub use token::StateClaims;
pub use token::TokenClaims;
pub use token::TokenCodec;
pub use token::TokenError;
pub use token::TokenKeys;
pub use token::TokenKind;
