use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::ProviderConfig;
use crate::domain::identity::models::ProviderToken;
use crate::identity::errors::ProviderError;

const USER_AGENT: &str = concat!("identity-service/", env!("CARGO_PKG_VERSION"));

/// Response from an OAuth2 token endpoint.
///
/// Some providers answer a failed exchange with `200 OK` and an `error`
/// field, so every field is optional.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Authorization-code client shared by the provider adapters.
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    scopes: Vec<String>,
    authorize_url: Url,
    token_url: String,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(
        config: &ProviderConfig,
        default_authorize_url: &str,
        default_token_url: &str,
    ) -> Result<Self, ProviderError> {
        let authorize_url = config
            .authorize_url
            .as_deref()
            .unwrap_or(default_authorize_url);
        let authorize_url = Url::parse(authorize_url)
            .map_err(|e| ProviderError::Configuration(format!("authorize url: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            scopes: config.scopes.clone(),
            authorize_url,
            token_url: config
                .token_url
                .clone()
                .unwrap_or_else(|| default_token_url.to_string()),
            http,
        })
    }

    /// Authorization URL with the standard parameters plus `extra`.
    pub fn authorization_url(
        &self,
        state: &str,
        pkce_challenge: Option<&str>,
        extra: &[(&str, &str)],
    ) -> String {
        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_url)
                .append_pair("state", state);
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            if let Some(challenge) = pkce_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }
        url.into()
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<ProviderToken, ProviderError> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
        ];
        if let Some(verifier) = pkce_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Exchange(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Exchange(format!("token endpoint HTTP {status}: {body}")));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Exchange(format!("token response parse error: {e}")))?;

        into_provider_token(body)
    }

    /// GET a JSON resource with the provider access token.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &ProviderToken,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&token.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::Profile(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ProviderError::Profile(format!(
                "{url} returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Profile(format!("{url} parse error: {e}")))
    }
}

fn into_provider_token(body: TokenResponse) -> Result<ProviderToken, ProviderError> {
    if let Some(error) = body.error {
        let description = body.error_description.unwrap_or_default();
        return Err(ProviderError::Exchange(format!("{error}: {description}")));
    }

    let access_token = body
        .access_token
        .ok_or_else(|| ProviderError::Exchange("token response without access_token".into()))?;

    Ok(ProviderToken {
        access_token,
        refresh_token: body.refresh_token,
        expires_in: body.expires_in,
    })
}
