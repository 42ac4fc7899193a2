pub mod claims;
pub mod codec;
pub mod errors;

pub use claims::AccessClaims;
pub use claims::InviteClaims;
pub use claims::OtpClaims;
pub use claims::RefreshClaims;
pub use claims::StateClaims;
pub use claims::TokenClaims;
pub use claims::TokenKind;
pub use codec::TokenCodec;
pub use codec::TokenKey;
pub use codec::TokenKeys;
pub use errors::TokenError;
