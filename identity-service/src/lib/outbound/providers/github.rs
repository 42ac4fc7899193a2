use async_trait::async_trait;
use serde::Deserialize;

use super::oauth::OAuthClient;
use crate::config::ProviderConfig;
use crate::domain::identity::models::EmailAddress;
use crate::domain::identity::models::ProviderProfile;
use crate::domain::identity::models::ProviderToken;
use crate::identity::errors::ProviderError;
use crate::identity::ports::IdentityProvider;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// `/user` does not say whether its `email` is verified, so the address is
/// taken from `/user/emails`: the primary entry, and only when verified.
fn to_profile(user: GitHubUser, emails: &[GitHubEmail]) -> ProviderProfile {
    let email = emails
        .iter()
        .find(|entry| entry.primary && entry.verified)
        .and_then(|entry| EmailAddress::new(&entry.email).ok());

    ProviderProfile {
        external_id: user.id.to_string(),
        email,
        name: user.name.or(Some(user.login)),
        avatar_url: user.avatar_url,
    }
}

pub struct GitHubProvider {
    oauth: OAuthClient,
    api_url: String,
}

impl GitHubProvider {
    pub const NAME: &'static str = "github";

    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            oauth: OAuthClient::new(config, AUTHORIZE_URL, TOKEN_URL)?,
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GitHubProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn build_auth_url(
        &self,
        state: &str,
        pkce_challenge: Option<&str>,
    ) -> Result<String, ProviderError> {
        Ok(self.oauth.authorization_url(state, pkce_challenge, &[]))
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<ProviderToken, ProviderError> {
        self.oauth.exchange_code(code, pkce_verifier).await
    }

    async fn fetch_profile(&self, token: &ProviderToken) -> Result<ProviderProfile, ProviderError> {
        let user: GitHubUser = self
            .oauth
            .get_json(&format!("{}/user", self.api_url), token)
            .await?;
        let emails: Vec<GitHubEmail> = self
            .oauth
            .get_json(&format!("{}/user/emails", self.api_url), token)
            .await?;

        Ok(to_profile(user, &emails))
    }
}
