//! Secure random material: opaque token values, one-time codes, throwaway
//! passwords and PKCE verifier/challenge pairs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;

const OPAQUE_TOKEN_LENGTH: usize = 32;
const RANDOM_PASSWORD_LENGTH: usize = 48;
pub const OTP_CODE_LENGTH: usize = 6;

fn alphanumeric(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Unguessable lookup key for a stored token record.
pub fn opaque_token() -> String {
    alphanumeric(OPAQUE_TOKEN_LENGTH)
}

/// Numeric code a user can type by hand.
pub fn numeric_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Password nobody knows. Used to invalidate a credential in place.
pub fn random_password() -> String {
    alphanumeric(RANDOM_PASSWORD_LENGTH)
}

/// PKCE code verifier (RFC 7636): 32 random bytes, base64url without padding.
pub fn pkce_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge for a PKCE verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
