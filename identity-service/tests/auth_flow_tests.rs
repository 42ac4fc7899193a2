mod common;

use std::sync::Arc;

use auth::random::pkce_challenge;
use auth::TokenKind;
use chrono::Duration;
use common::email;
use common::TestApp;
use common::GOOD_CODE;
use common::PROVIDER;
use identity_service::domain::identity::models::AuthenticateCommand;
use identity_service::domain::identity::models::NotificationTemplate;
use identity_service::domain::identity::models::OtpKind;
use identity_service::domain::identity::models::ProviderKind;
use identity_service::domain::identity::models::ProviderProfile;
use identity_service::identity::errors::AuthError;
use identity_service::identity::ports::AuthServicePort;
use identity_service::identity::ports::CredentialStore;
use url::Url;

async fn sign_in(app: &TestApp, address: &str, password: &str) -> Result<(), AuthError> {
    app.service
        .authenticate(AuthenticateCommand::credentials(email(address), password))
        .await
        .map(|_| ())
}

struct TokenPair {
    access: String,
    refresh: String,
}

async fn issue_tokens(app: &TestApp, address: &str) -> TokenPair {
    let user = app
        .service
        .authenticate(AuthenticateCommand::credentials(email(address), "pass_word!"))
        .await
        .expect("Signup failed");
    let info = app
        .service
        .resolve_user_info(&user.id)
        .await
        .expect("Failed to resolve user info");
    let tokens = app
        .service
        .create_auth_tokens(&info)
        .await
        .expect("Failed to create tokens");

    TokenPair {
        access: tokens.access_token,
        refresh: tokens.refresh_token,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_has_single_winner() {
    let app = TestApp::spawn();
    let pair = issue_tokens(&app, "race@example.com").await;

    let attempts = (0..16).map(|_| {
        let service = Arc::clone(&app.service);
        let refresh = pair.refresh.clone();
        tokio::spawn(async move { service.handle_refresh_token(&refresh).await })
    });
    let results = futures::future::join_all(attempts).await;

    let winners = results
        .into_iter()
        .map(|joined| joined.expect("Task panicked"))
        .filter(|result| {
            if let Err(e) = result {
                assert!(matches!(e, AuthError::TokenInvalid), "unexpected error: {e}");
            }
            result.is_ok()
        })
        .count();

    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_rotated_refresh_token_keeps_roles() {
    let app = TestApp::spawn();
    let pair = issue_tokens(&app, "roles@example.com").await;

    let rotated = app.service.handle_refresh_token(&pair.refresh).await.unwrap();
    let claims = app
        .service
        .validate_access_token(&rotated.access_token)
        .await
        .unwrap();

    assert_eq!(claims.email, "roles@example.com");
    assert_eq!(claims.roles, vec!["basic"]);
    assert_eq!(claims.permissions, vec!["profile:read", "profile:write"]);
    assert_eq!(rotated.token_type, "Bearer");
    assert_eq!(rotated.expires_in, 15 * 60);
}

#[tokio::test]
async fn test_signout_revokes_refresh_token() {
    let app = TestApp::spawn();
    let pair = issue_tokens(&app, "leaving@example.com").await;

    app.service.signout(&pair.refresh).await.unwrap();

    let refresh = app.service.handle_refresh_token(&pair.refresh).await;
    assert!(matches!(refresh, Err(AuthError::TokenInvalid)));

    let again = app.service.signout(&pair.refresh).await;
    assert!(matches!(again, Err(AuthError::TokenInvalid)));

    // Access tokens are stateless and stay valid until they expire.
    assert!(app.service.validate_access_token(&pair.access).await.is_ok());
}

#[tokio::test]
async fn test_signout_rejects_access_token() {
    let app = TestApp::spawn();
    let pair = issue_tokens(&app, "confused@example.com").await;

    let stored = app.tokens.len();

    let result = app.service.signout(&pair.access).await;
    assert!(matches!(result, Err(AuthError::TokenInvalid)));
    assert_eq!(app.tokens.len(), stored);
    assert!(app.service.handle_refresh_token(&pair.refresh).await.is_ok());
}

#[tokio::test]
async fn test_signup_with_undefined_default_role_fails() {
    let app = TestApp::with_default_role("superuser");

    let result = sign_in(&app, "orphan@example.com", "pass_word!").await;

    assert!(matches!(result, Err(AuthError::Upstream { .. })));
    assert_eq!(app.credentials.account_count(), 0);
    assert_eq!(app.dispatcher.count(NotificationTemplate::EmailVerification), 0);
}

#[tokio::test]
async fn test_password_reset_is_single_use() {
    let app = TestApp::spawn();
    sign_in(&app, "forgetful@example.com", "old-password").await.unwrap();

    app.service
        .request_password_reset(&email("Forgetful@Example.com"), None)
        .await
        .unwrap();
    assert_eq!(app.dispatcher.count(NotificationTemplate::PasswordReset), 1);
    let token = app.dispatcher.last_token(NotificationTemplate::PasswordReset);

    app.service
        .handle_password_reset_token(&token, "new-password")
        .await
        .unwrap();

    let replay = app
        .service
        .handle_password_reset_token(&token, "attacker-password")
        .await;
    assert!(matches!(replay, Err(AuthError::TokenInvalid)));

    assert!(sign_in(&app, "forgetful@example.com", "new-password").await.is_ok());
    assert!(matches!(
        sign_in(&app, "forgetful@example.com", "old-password").await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_reset_token_cannot_verify_email() {
    let app = TestApp::spawn();
    sign_in(&app, "mixed@example.com", "pass_word!").await.unwrap();
    app.service
        .request_password_reset(&email("mixed@example.com"), None)
        .await
        .unwrap();
    let token = app.dispatcher.last_token(NotificationTemplate::PasswordReset);

    let result = app.service.handle_verification_token(&token).await;
    assert!(matches!(result, Err(AuthError::TokenInvalid)));

    // The rejected attempt must not burn the reset token.
    app.service
        .handle_password_reset_token(&token, "new-password")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_password_reset_without_local_account_is_silent() {
    let app = TestApp::spawn();
    let redirect = app.service.begin_oauth(PROVIDER, None).await.unwrap();
    app.service.complete_oauth(&redirect.state, GOOD_CODE).await.unwrap();

    app.service
        .request_password_reset(&email("owner@example.com"), None)
        .await
        .unwrap();

    assert_eq!(app.dispatcher.count(NotificationTemplate::PasswordReset), 0);
}

#[tokio::test]
async fn test_verification_flow_and_already_verified() {
    let app = TestApp::spawn();
    sign_in(&app, "newbie@example.com", "pass_word!").await.unwrap();
    let token = app.dispatcher.last_token(NotificationTemplate::EmailVerification);

    let user = app.service.handle_verification_token(&token).await.unwrap();
    assert!(user.is_email_verified());

    let user = app
        .credentials
        .find_user_by_email(&email("newbie@example.com"))
        .await
        .unwrap()
        .unwrap();
    app.service
        .send_otp_email(OtpKind::Verification, &user, None)
        .await
        .unwrap();
    let second = app.dispatcher.last_token(NotificationTemplate::EmailVerification);

    let result = app.service.handle_verification_token(&second).await;
    assert!(matches!(result, Err(AuthError::AlreadyVerified)));
}

#[tokio::test]
async fn test_expired_verification_token_is_rejected() {
    let app = TestApp::with_ttl(&[(TokenKind::Verification, Duration::seconds(-5))]);
    sign_in(&app, "late@example.com", "pass_word!").await.unwrap();
    let token = app.dispatcher.last_token(NotificationTemplate::EmailVerification);

    let result = app.service.handle_verification_token(&token).await;
    assert!(matches!(result, Err(AuthError::TokenInvalid)));
}

#[tokio::test]
async fn test_oauth_round_trip_with_pkce() {
    let app = TestApp::spawn();

    let redirect = app
        .service
        .begin_oauth(PROVIDER, Some("/dashboard".into()))
        .await
        .unwrap();

    let url = Url::parse(&redirect.url).unwrap();
    let challenge = url
        .query_pairs()
        .find(|(key, _)| key == "code_challenge")
        .map(|(_, value)| value.into_owned())
        .expect("Missing code_challenge");

    let outcome = app
        .service
        .complete_oauth(&redirect.state, GOOD_CODE)
        .await
        .unwrap();

    let verifier = app.provider.seen_verifier().expect("Verifier not forwarded");
    assert_eq!(pkce_challenge(&verifier), challenge);
    assert_eq!(outcome.redirect_to.as_deref(), Some("/dashboard"));
    assert_eq!(outcome.user.email.as_str(), "owner@example.com");
    assert!(outcome.user.is_email_verified());

    let account = app
        .credentials
        .find_account(&outcome.user.id, &ProviderKind::Federated(PROVIDER.into()))
        .await
        .unwrap()
        .expect("Federated account missing");
    assert_eq!(account.access_token.as_deref(), Some("provider-access"));
    assert_eq!(account.refresh_token.as_deref(), Some("provider-refresh"));
    assert!(app.tokens.is_empty());
}

#[tokio::test]
async fn test_oauth_state_cannot_be_replayed() {
    let app = TestApp::spawn();
    let redirect = app.service.begin_oauth(PROVIDER, None).await.unwrap();

    app.service
        .complete_oauth(&redirect.state, GOOD_CODE)
        .await
        .unwrap();

    let replay = app.service.complete_oauth(&redirect.state, GOOD_CODE).await;
    assert!(matches!(replay, Err(AuthError::TokenInvalid)));
}

#[tokio::test]
async fn test_oauth_failed_exchange_burns_state() {
    let app = TestApp::spawn();
    let redirect = app.service.begin_oauth(PROVIDER, None).await.unwrap();

    let failed = app.service.complete_oauth(&redirect.state, "bad-code").await;
    assert!(matches!(failed, Err(AuthError::ProviderExchangeFailed(_))));

    let retry = app.service.complete_oauth(&redirect.state, GOOD_CODE).await;
    assert!(matches!(retry, Err(AuthError::TokenInvalid)));
}

#[tokio::test]
async fn test_oauth_unknown_provider_is_disabled() {
    let app = TestApp::spawn();

    let result = app.service.begin_oauth("myspace", None).await;
    assert!(matches!(result, Err(AuthError::ProviderDisabled(name)) if name == "myspace"));
}

#[tokio::test]
async fn test_oauth_without_verified_email_is_rejected() {
    let app = TestApp::spawn();
    app.provider.set_profile(ProviderProfile {
        external_id: "acme-7".into(),
        email: None,
        name: None,
        avatar_url: None,
    });

    let redirect = app.service.begin_oauth(PROVIDER, None).await.unwrap();
    let result = app.service.complete_oauth(&redirect.state, GOOD_CODE).await;

    assert!(matches!(result, Err(AuthError::UnverifiedProviderEmail)));
    assert_eq!(app.credentials.user_count(), 0);
}

#[tokio::test]
async fn test_oauth_login_heals_squatted_account() {
    let app = TestApp::spawn();
    sign_in(&app, "owner@example.com", "squatter-password").await.unwrap();

    let redirect = app.service.begin_oauth(PROVIDER, None).await.unwrap();
    let outcome = app
        .service
        .complete_oauth(&redirect.state, GOOD_CODE)
        .await
        .unwrap();

    assert!(outcome.user.is_email_verified());
    assert_eq!(app.credentials.user_count(), 1);
    assert_eq!(app.credentials.account_count(), 2);
    assert_eq!(
        app.dispatcher.count(NotificationTemplate::SecurityPasswordReset),
        1
    );
    assert!(matches!(
        sign_in(&app, "owner@example.com", "squatter-password").await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_invite_is_single_use() {
    let app = TestApp::spawn();

    app.service
        .send_invite(&email("guest@example.com"), Some("/team".into()))
        .await
        .unwrap();
    let token = app.dispatcher.last_token(NotificationTemplate::Invite);

    let claims = app.service.redeem_invite(&token).await.unwrap();
    assert_eq!(claims.email, "guest@example.com");
    assert_eq!(claims.redirect_to.as_deref(), Some("/team"));

    let replay = app.service.redeem_invite(&token).await;
    assert!(matches!(replay, Err(AuthError::TokenInvalid)));
}
