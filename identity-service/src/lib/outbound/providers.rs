pub mod github;
pub mod google;
pub mod oauth;

use std::collections::HashMap;
use std::sync::Arc;

pub use github::GitHubProvider;
pub use google::GoogleProvider;

use crate::config::ProviderConfig;
use crate::identity::errors::ProviderError;
use crate::identity::ports::IdentityProvider;
use crate::identity::ports::IdentityProviderRegistry;

/// Build the registry from the `providers` configuration table.
///
/// Disabled entries are left out, so lookups for them fail with
/// `ProviderDisabled`.
///
/// # Errors
/// * `Configuration` - Unknown provider name or invalid endpoint
pub fn build_registry(
    providers: &HashMap<String, ProviderConfig>,
) -> Result<IdentityProviderRegistry, ProviderError> {
    let mut registry = IdentityProviderRegistry::new();

    for (name, config) in providers {
        if !config.enabled {
            tracing::info!(provider = %name, "Identity provider disabled");
            continue;
        }

        let provider: Arc<dyn IdentityProvider> = match name.as_str() {
            GoogleProvider::NAME => Arc::new(GoogleProvider::new(config)?),
            GitHubProvider::NAME => Arc::new(GitHubProvider::new(config)?),
            other => {
                return Err(ProviderError::Configuration(format!(
                    "unsupported identity provider: {other}"
                )))
            }
        };

        tracing::info!(provider = %name, "Identity provider enabled");
        registry = registry.register(provider);
    }

    Ok(registry)
}
