use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Purpose a signed token was minted for.
///
/// Serialized into every payload as the `type` claim. A token is only ever
/// accepted by a verifier expecting the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    Verification,
    PasswordReset,
    State,
    Invite,
}

impl TokenKind {
    pub const ALL: [TokenKind; 6] = [
        TokenKind::Access,
        TokenKind::Refresh,
        TokenKind::Verification,
        TokenKind::PasswordReset,
        TokenKind::State,
        TokenKind::Invite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Verification => "verification",
            TokenKind::PasswordReset => "password_reset",
            TokenKind::State => "state",
            TokenKind::Invite => "invite",
        }
    }

    /// Access tokens are stateless; every other kind is backed by a stored record.
    pub fn is_persisted(&self) -> bool {
        !matches!(self, TokenKind::Access)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown token kind: {}", s))
    }
}

/// A claims payload that can be signed by the codec.
pub trait TokenClaims: Serialize {
    /// Kind declared by this payload; selects the signing secret.
    fn kind(&self) -> TokenKind;
}

fn window(ttl: Duration) -> (i64, i64) {
    let now = Utc::now();
    (now.timestamp(), (now + ttl).timestamp())
}

/// Short-lived bearer credential. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessClaims {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub sub: String,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn new(
        user_id: impl ToString,
        email: impl ToString,
        roles: Vec<String>,
        permissions: Vec<String>,
        ttl: Duration,
    ) -> Self {
        let (iat, exp) = window(ttl);
        Self {
            kind: TokenKind::Access,
            sub: user_id.to_string(),
            email: email.to_string(),
            roles,
            permissions,
            iat,
            exp,
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

impl TokenClaims for AccessClaims {
    fn kind(&self) -> TokenKind {
        self.kind
    }
}

/// Rotation credential. `token` is the opaque value of its stored record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshClaims {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub sub: String,
    pub email: String,
    pub token: String,
    pub iat: i64,
    pub exp: i64,
}

impl RefreshClaims {
    pub fn new(user_id: impl ToString, email: impl ToString, token: String, ttl: Duration) -> Self {
        let (iat, exp) = window(ttl);
        Self {
            kind: TokenKind::Refresh,
            sub: user_id.to_string(),
            email: email.to_string(),
            token,
            iat,
            exp,
        }
    }
}

impl TokenClaims for RefreshClaims {
    fn kind(&self) -> TokenKind {
        self.kind
    }
}

/// Email verification and password reset payload.
///
/// Carries both the opaque value used in deep links and a short numeric
/// code for manual entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtpClaims {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub sub: String,
    pub email: String,
    pub token: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl OtpClaims {
    pub fn new(
        kind: TokenKind,
        user_id: impl ToString,
        email: impl ToString,
        token: String,
        code: String,
        redirect_to: Option<String>,
        ttl: Duration,
    ) -> Self {
        let (iat, exp) = window(ttl);
        Self {
            kind,
            sub: user_id.to_string(),
            email: email.to_string(),
            token,
            code,
            redirect_to,
            iat,
            exp,
        }
    }
}

impl TokenClaims for OtpClaims {
    fn kind(&self) -> TokenKind {
        self.kind
    }
}

/// OAuth CSRF state with the PKCE verifier bound to the authorization request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateClaims {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub token: String,
    pub provider: String,
    pub code_verifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl StateClaims {
    pub fn new(
        token: String,
        provider: impl ToString,
        code_verifier: String,
        redirect_to: Option<String>,
        ttl: Duration,
    ) -> Self {
        let (iat, exp) = window(ttl);
        Self {
            kind: TokenKind::State,
            token,
            provider: provider.to_string(),
            code_verifier,
            redirect_to,
            iat,
            exp,
        }
    }
}

impl TokenClaims for StateClaims {
    fn kind(&self) -> TokenKind {
        self.kind
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InviteClaims {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub email: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl InviteClaims {
    pub fn new(
        email: impl ToString,
        token: String,
        redirect_to: Option<String>,
        ttl: Duration,
    ) -> Self {
        let (iat, exp) = window(ttl);
        Self {
            kind: TokenKind::Invite,
            email: email.to_string(),
            token,
            redirect_to,
            iat,
            exp,
        }
    }
}

impl TokenClaims for InviteClaims {
    fn kind(&self) -> TokenKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_snake_case() {
        let value = serde_json::to_value(TokenKind::PasswordReset).unwrap();
        assert_eq!(value, serde_json::json!("password_reset"));
    }

    #[test]
    fn test_kind_from_str() {
        for kind in TokenKind::ALL {
            assert_eq!(kind.as_str().parse::<TokenKind>(), Ok(kind));
        }
        assert!("bearer".parse::<TokenKind>().is_err());
    }

    #[test]
    fn test_only_access_is_stateless() {
        assert!(!TokenKind::Access.is_persisted());
        assert!(TokenKind::Refresh.is_persisted());
        assert!(TokenKind::State.is_persisted());
    }

    #[test]
    fn test_access_claims_window() {
        let claims = AccessClaims::new(
            "user123",
            "alice@example.com",
            vec!["basic".to_string()],
            vec!["profile:read".to_string()],
            Duration::minutes(15),
        );

        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        assert!(claims.has_permission("profile:read"));
        assert!(!claims.has_permission("admin"));
    }

    #[test]
    fn test_type_claim_is_named_type() {
        let claims = RefreshClaims::new("u", "e@example.com", "opaque".into(), Duration::hours(1));
        let value = serde_json::to_value(&claims).unwrap();

        assert_eq!(value["type"], "refresh");
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn test_optional_redirect_is_omitted() {
        let claims = StateClaims::new(
            "opaque".into(),
            "google",
            "verifier".into(),
            None,
            Duration::minutes(10),
        );
        let value = serde_json::to_value(&claims).unwrap();

        assert!(value.get("redirect_to").is_none());
        assert_eq!(value["provider"], "google");
    }
}
