use std::collections::HashMap;
use std::env;

use auth::TokenKeys;
use auth::TokenKind;
use config::Config as ConfigBuilder;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub app: AppConfig,
    pub tokens: TokenSettings,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Confirmation links in outbound email are built from this.
    pub base_url: Url,
    #[serde(default = "default_role")]
    pub default_role: String,
    /// Interval between expired token record sweeps.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_seconds: u64,
}

/// Largest lifetime `chrono::Duration::seconds` accepts.
const MAX_TTL_SECONDS: i64 = i64::MAX / 1_000;

#[derive(Debug, Deserialize, Clone)]
pub struct TokenKindConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

/// Signing secret and lifetime for every token kind.
#[derive(Debug, Deserialize, Clone)]
pub struct TokenSettings {
    pub access: TokenKindConfig,
    pub refresh: TokenKindConfig,
    pub verification: TokenKindConfig,
    pub password_reset: TokenKindConfig,
    pub state: TokenKindConfig,
    pub invite: TokenKindConfig,
}

impl TokenSettings {
    fn get(&self, kind: TokenKind) -> &TokenKindConfig {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::Verification => &self.verification,
            TokenKind::PasswordReset => &self.password_reset,
            TokenKind::State => &self.state,
            TokenKind::Invite => &self.invite,
        }
    }

    /// Build the codec key table.
    pub fn keys(&self) -> TokenKeys {
        TokenKind::ALL
            .into_iter()
            .fold(TokenKeys::new(), |keys, kind| {
                let entry = self.get(kind);
                keys.with(
                    kind,
                    entry.secret.as_bytes(),
                    chrono::Duration::seconds(entry.ttl_seconds),
                )
            })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub redirect_url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Endpoint overrides, mainly for tests and self-hosted deployments.
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    pub webhook_url: Option<String>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            webhook_url: None,
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_role() -> String {
    "basic".to_string()
}

fn default_purge_interval() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    1024
}

impl Config {
    /// Load configuration from files with environment variable overrides
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (DATABASE__URL, TOKENS__ACCESS__SECRET, etc.)
    /// 2. Environment-specific config file (config/{environment}.toml)
    /// 3. Default config file (config/default.toml)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        ConfigBuilder::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Example: TOKENS__ACCESS__SECRET=... overrides tokens.access.secret
            .add_source(Environment::default().separator("__"))
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// Reject values that would panic once handed to the runtime.
    fn validated(self) -> Result<Self, ConfigError> {
        if self.app.purge_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "app.purge_interval_seconds must be greater than zero".to_string(),
            ));
        }

        for kind in TokenKind::ALL {
            let ttl = self.tokens.get(kind).ttl_seconds;
            if ttl <= 0 || ttl > MAX_TTL_SECONDS {
                return Err(ConfigError::Message(format!(
                    "tokens.{kind}.ttl_seconds must be between 1 and {MAX_TTL_SECONDS}, got {ttl}"
                )));
            }
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    const SAMPLE: &str = r#"
        [database]
        url = "postgres://localhost/identity"

        [app]
        base_url = "https://app.example.com"

        [tokens.access]
        secret = "access-secret"
        ttl_seconds = 900

        [tokens.refresh]
        secret = "refresh-secret"
        ttl_seconds = 2592000

        [tokens.verification]
        secret = "verification-secret"
        ttl_seconds = 86400

        [tokens.password_reset]
        secret = "reset-secret"
        ttl_seconds = 3600

        [tokens.state]
        secret = "state-secret"
        ttl_seconds = 600

        [tokens.invite]
        secret = "invite-secret"
        ttl_seconds = 604800

        [providers.google]
        client_id = "id"
        client_secret = "secret"
        scopes = ["openid", "email", "profile"]
        redirect_url = "https://app.example.com/auth/callback/google"

        [providers.github]
        client_id = "id"
        client_secret = "secret"
        redirect_url = "https://app.example.com/auth/callback/github"
        enabled = false
    "#;

    fn sample() -> Config {
        ConfigBuilder::builder()
            .add_source(File::from_str(SAMPLE, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_are_applied() {
        let config = sample();

        assert_eq!(config.app.default_role, "basic");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.notifications.queue_capacity, 1024);
        assert!(config.notifications.webhook_url.is_none());
        assert!(config.providers["google"].enabled);
        assert!(!config.providers["github"].enabled);
    }

    #[test]
    fn test_token_keys_cover_every_kind() {
        let keys = sample().tokens.keys();

        for kind in TokenKind::ALL {
            assert!(keys.get(kind).is_some(), "missing key for {kind}");
        }
        assert_eq!(
            keys.get(TokenKind::State).map(|key| key.ttl),
            Some(chrono::Duration::seconds(600))
        );
    }

    #[test]
    fn test_sample_passes_validation() {
        assert!(sample().validated().is_ok());
    }

    #[test]
    fn test_zero_purge_interval_is_rejected() {
        let mut config = sample();
        config.app.purge_interval_seconds = 0;

        let error = config.validated().unwrap_err();
        assert!(error.to_string().contains("purge_interval_seconds"));
    }

    #[test]
    fn test_out_of_range_ttl_is_rejected() {
        let mut config = sample();
        config.tokens.refresh.ttl_seconds = i64::MAX;
        assert!(config.validated().is_err());

        let mut config = sample();
        config.tokens.state.ttl_seconds = 0;
        assert!(config.validated().is_err());
    }
}
