use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::Error as PhcError;
use argon2::password_hash::PasswordHash;
use argon2::password_hash::PasswordHasher as Argon2PasswordHasher;
use argon2::password_hash::PasswordVerifier;
use argon2::password_hash::SaltString;
use argon2::Argon2;

use super::errors::PasswordError;

/// One-way password hashing (Argon2id, PHC string output).
///
/// Every call to [`PasswordHasher::hash`] draws a fresh salt, so hashing the
/// same password twice yields two different digests. Verification delegates
/// to the Argon2 verifier, which compares digests in constant time.
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Create a hasher using the Argon2id defaults.
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Hash a plaintext password.
    ///
    /// # Arguments
    /// * `password` - Plaintext password to hash
    ///
    /// # Returns
    /// Self-describing PHC string (algorithm, parameters, salt and digest)
    ///
    /// # Errors
    /// * `HashingFailed` - Argon2 rejected the input or parameters
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// A wrong password is not an error: it returns `Ok(false)`.
    ///
    /// # Arguments
    /// * `hash` - Stored PHC string
    /// * `password` - Plaintext candidate
    ///
    /// # Errors
    /// * `VerificationFailed` - The stored hash is malformed or uses unsupported parameters
    pub fn verify(&self, hash: &str, password: &str) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            PasswordError::VerificationFailed(format!("Invalid password hash: {}", e))
        })?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new();
        let password = "correct horse battery staple";

        let hash = hasher.hash(password).expect("Failed to hash password");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher
            .verify(&hash, password)
            .expect("Failed to verify password"));
        assert!(!hasher
            .verify(&hash, "Correct horse battery staple")
            .expect("Failed to verify password"));
    }

    #[test]
    fn test_hash_uses_unique_salt() {
        let hasher = PasswordHasher::new();

        let first = hasher.hash("same_password").unwrap();
        let second = hasher.hash("same_password").unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify(&first, "same_password").unwrap());
        assert!(hasher.verify(&second, "same_password").unwrap());
    }

    #[test]
    fn test_verify_empty_password_does_not_match() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("not_empty").unwrap();

        assert!(!hasher.verify(&hash, "").unwrap());
    }

    #[test]
    fn test_verify_malformed_hash() {
        let hasher = PasswordHasher::new();
        let result = hasher.verify("not-a-phc-string", "password");

        assert!(matches!(result, Err(PasswordError::VerificationFailed(_))));
    }
}
