use std::collections::HashMap;

use chrono::Duration;
use jsonwebtoken::decode;
use jsonwebtoken::encode;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use serde::de::DeserializeOwned;

use super::claims::TokenClaims;
use super::claims::TokenKind;
use super::errors::TokenError;

/// Secret and lifetime for one token kind.
#[derive(Clone)]
pub struct TokenKey {
    pub secret: Vec<u8>,
    pub ttl: Duration,
}

/// Per-kind key table handed to [`TokenCodec::new`].
#[derive(Clone, Default)]
pub struct TokenKeys {
    keys: HashMap<TokenKind, TokenKey>,
}

impl TokenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the secret and TTL used for `kind`.
    pub fn with(mut self, kind: TokenKind, secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        self.keys.insert(
            kind,
            TokenKey {
                secret: secret.as_ref().to_vec(),
                ttl,
            },
        );
        self
    }

    pub fn get(&self, kind: TokenKind) -> Option<&TokenKey> {
        self.keys.get(&kind)
    }
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

/// Signs and verifies typed, time-boxed claim bundles.
///
/// Each [`TokenKind`] has its own HS256 secret. Parsing always checks the
/// signature under the secret of the *expected* kind, then the expiry, then
/// the `type` claim. A token minted for one purpose is never accepted for
/// another, even when two kinds happen to share a secret.
pub struct TokenCodec {
    keys: HashMap<TokenKind, KindKeys>,
    algorithm: Algorithm,
}

impl TokenCodec {
    pub fn new(keys: TokenKeys) -> Self {
        let keys = keys
            .keys
            .into_iter()
            .map(|(kind, key)| {
                (
                    kind,
                    KindKeys {
                        encoding: EncodingKey::from_secret(&key.secret),
                        decoding: DecodingKey::from_secret(&key.secret),
                        ttl: key.ttl,
                    },
                )
            })
            .collect();

        Self {
            keys,
            algorithm: Algorithm::HS256,
        }
    }

    fn keys_for(&self, kind: TokenKind) -> Result<&KindKeys, TokenError> {
        self.keys.get(&kind).ok_or(TokenError::MissingKey(kind))
    }

    /// Configured lifetime for tokens of `kind`.
    pub fn ttl(&self, kind: TokenKind) -> Result<Duration, TokenError> {
        self.keys_for(kind).map(|keys| keys.ttl)
    }

    /// Sign a claims payload with the secret of its declared kind.
    ///
    /// # Errors
    /// * `MissingKey` - No secret configured for the declared kind
    /// * `EncodingFailed` - Serialization or signing failed
    pub fn issue<C: TokenClaims>(&self, claims: &C) -> Result<String, TokenError> {
        let keys = self.keys_for(claims.kind())?;

        encode(&Header::new(self.algorithm), claims, &keys.encoding)
            .map_err(|e| TokenError::EncodingFailed(e.to_string()))
    }

    /// Verify a signed token and decode it as the expected kind.
    ///
    /// # Errors
    /// * `InvalidSignature` - Signature does not validate under the expected kind's secret
    /// * `Expired` - `exp` is in the past
    /// * `TypeMismatch` - The payload declares a different `type`
    /// * `Malformed` - Not a JWT, or the payload lacks fields of the expected kind
    /// * `MissingKey` - No secret configured for the expected kind
    pub fn parse<C: DeserializeOwned>(
        &self,
        token: &str,
        expected: TokenKind,
    ) -> Result<C, TokenError> {
        let keys = self.keys_for(expected)?;

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<serde_json::Value>(token, &keys.decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(e.to_string()),
            },
        )?;

        let found = data
            .claims
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        if found != expected.as_str() {
            return Err(TokenError::TypeMismatch {
                expected,
                found: found.to_string(),
            });
        }

        serde_json::from_value(data.claims).map_err(|e| TokenError::Malformed(e.to_string()))
    }
}
