use async_trait::async_trait;
use serde::Deserialize;

use super::oauth::OAuthClient;
use crate::config::ProviderConfig;
use crate::domain::identity::models::EmailAddress;
use crate::domain::identity::models::ProviderProfile;
use crate::domain::identity::models::ProviderToken;
use crate::identity::errors::ProviderError;
use crate::identity::ports::IdentityProvider;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// OpenID Connect userinfo payload.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl From<GoogleUserInfo> for ProviderProfile {
    fn from(info: GoogleUserInfo) -> Self {
        let email = info
            .email
            .filter(|_| info.email_verified)
            .and_then(|email| EmailAddress::new(email).ok());

        ProviderProfile {
            external_id: info.sub,
            email,
            name: info.name,
            avatar_url: info.picture,
        }
    }
}

pub struct GoogleProvider {
    oauth: OAuthClient,
    userinfo_url: String,
}

impl GoogleProvider {
    pub const NAME: &'static str = "google";

    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            oauth: OAuthClient::new(config, AUTHORIZE_URL, TOKEN_URL)?,
            userinfo_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| USERINFO_URL.to_string()),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn build_auth_url(
        &self,
        state: &str,
        pkce_challenge: Option<&str>,
    ) -> Result<String, ProviderError> {
        Ok(self
            .oauth
            .authorization_url(state, pkce_challenge, &[("access_type", "offline")]))
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<ProviderToken, ProviderError> {
        self.oauth.exchange_code(code, pkce_verifier).await
    }

    async fn fetch_profile(&self, token: &ProviderToken) -> Result<ProviderProfile, ProviderError> {
        let info: GoogleUserInfo = self.oauth.get_json(&self.userinfo_url, token).await?;
        Ok(info.into())
    }
}
