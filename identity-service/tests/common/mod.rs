use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use auth::TokenCodec;
use auth::TokenKeys;
use auth::TokenKind;
use chrono::Duration;
use identity_service::domain::identity::models::EmailAddress;
use identity_service::domain::identity::models::Notification;
use identity_service::domain::identity::models::NotificationTemplate;
use identity_service::domain::identity::models::ProviderProfile;
use identity_service::domain::identity::models::ProviderToken;
use identity_service::domain::identity::service::AuthService;
use identity_service::domain::identity::service::AuthSettings;
use identity_service::identity::errors::ProviderError;
use identity_service::identity::ports::IdentityProvider;
use identity_service::identity::ports::IdentityProviderRegistry;
use identity_service::identity::ports::NotificationDispatcher;
use identity_service::repositories::InMemoryCredentialStore;
use identity_service::repositories::InMemoryTokenStore;
use url::Url;

pub const PROVIDER: &str = "acme";
pub const GOOD_CODE: &str = "good-code";

pub type TestService = AuthService<InMemoryCredentialStore, InMemoryTokenStore, RecordingDispatcher>;

/// Orchestrator wired against in-memory adapters
pub struct TestApp {
    pub service: Arc<TestService>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub tokens: Arc<InMemoryTokenStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub provider: Arc<FakeProvider>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_ttl(&[])
    }

    /// Build the app with per-kind TTL overrides (default 15 minutes).
    pub fn with_ttl(overrides: &[(TokenKind, Duration)]) -> Self {
        Self::build(overrides, "basic")
    }

    /// Build the app with a default role that may not be defined in the store.
    pub fn with_default_role(role: &str) -> Self {
        Self::build(&[], role)
    }

    fn build(overrides: &[(TokenKind, Duration)], default_role: &str) -> Self {
        let keys = TokenKind::ALL.into_iter().fold(TokenKeys::new(), |keys, kind| {
            let ttl = overrides
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, ttl)| *ttl)
                .unwrap_or_else(|| Duration::minutes(15));
            keys.with(kind, format!("test-{kind}-secret-at-least-32-bytes-long"), ttl)
        });

        let credentials = Arc::new(
            InMemoryCredentialStore::new().with_role("basic", &["profile:read", "profile:write"]),
        );
        let tokens = Arc::new(InMemoryTokenStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let provider = Arc::new(FakeProvider::new());

        let service = Arc::new(AuthService::new(
            Arc::clone(&credentials),
            Arc::clone(&tokens),
            Arc::clone(&dispatcher),
            IdentityProviderRegistry::new().register(provider.clone()),
            TokenCodec::new(keys),
            AuthSettings::new(
                Url::parse("https://app.example.com").expect("Invalid base url"),
                default_role,
            ),
        ));

        Self {
            service,
            credentials,
            tokens,
            dispatcher,
            provider,
        }
    }
}

pub fn email(address: &str) -> EmailAddress {
    EmailAddress::new(address).expect("Invalid test email")
}

/// Dispatcher that keeps every notification for inspection
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, template: NotificationTemplate) -> usize {
        self.sent().iter().filter(|n| n.template == template).count()
    }

    /// Signed token from the most recent confirmation link of `template`.
    pub fn last_token(&self, template: NotificationTemplate) -> String {
        let notification = self
            .sent()
            .into_iter()
            .rev()
            .find(|n| n.template == template)
            .expect("No notification with this template");
        let url = Url::parse(notification.confirmation_url.as_deref().expect("No link"))
            .expect("Invalid confirmation link");

        url.query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
            .expect("Link without token")
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

/// Identity provider double accepting a single authorization code
pub struct FakeProvider {
    profile: Mutex<ProviderProfile>,
    seen_verifier: Mutex<Option<String>>,
}

impl FakeProvider {
    fn new() -> Self {
        Self {
            profile: Mutex::new(ProviderProfile {
                external_id: "acme-42".to_string(),
                email: Some(email("owner@example.com")),
                name: Some("Owner".to_string()),
                avatar_url: None,
            }),
            seen_verifier: Mutex::new(None),
        }
    }

    pub fn set_profile(&self, profile: ProviderProfile) {
        *self.profile.lock().unwrap() = profile;
    }

    pub fn seen_verifier(&self) -> Option<String> {
        self.seen_verifier.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn build_auth_url(
        &self,
        state: &str,
        pkce_challenge: Option<&str>,
    ) -> Result<String, ProviderError> {
        let mut url = Url::parse("https://idp.example.com/authorize")
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        url.query_pairs_mut().append_pair("state", state);
        if let Some(challenge) = pkce_challenge {
            url.query_pairs_mut().append_pair("code_challenge", challenge);
        }
        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<ProviderToken, ProviderError> {
        *self.seen_verifier.lock().unwrap() = pkce_verifier.map(str::to_string);

        if code != GOOD_CODE {
            return Err(ProviderError::Exchange("bad_verification_code".into()));
        }

        Ok(ProviderToken {
            access_token: "provider-access".to_string(),
            refresh_token: Some("provider-refresh".to_string()),
            expires_in: Some(3600),
        })
    }

    async fn fetch_profile(&self, _token: &ProviderToken) -> Result<ProviderProfile, ProviderError> {
        Ok(self.profile.lock().unwrap().clone())
    }
}
