//! Credential Resolution
//!
//! Picks the single authentication strategy applied to a request from
//! whatever credentials a [`ServiceConfig`] currently holds.

use crate::config::ServiceConfig;

use super::token::TokenCredentials;

/// Target URLs under this prefix take the API key as `apikey`; all others as `api_key`
pub const LEGACY_GATEWAY_PREFIX: &str = "https://gateway-a.watsonplatform.net/calls";

/// The authentication applied to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    None,
    /// Static key injected as a query parameter named `param`
    ApiKeyQueryParam { param: &'static str, key: String },
    /// `Authorization: Bearer` from the client's token provider
    BearerToken(TokenCredentials),
    /// Credentials attached by the transport
    BasicAuth { username: String, password: String },
}

impl AuthStrategy {
    /// Short name for logging. Never includes credential values.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthStrategy::None => "none",
            AuthStrategy::ApiKeyQueryParam { .. } => "api_key",
            AuthStrategy::BearerToken(_) => "bearer",
            AuthStrategy::BasicAuth { .. } => "basic",
        }
    }
}

/// Resolve the active strategy for a call to `target_url` (base URL + path).
///
/// First match wins: API key, then bearer-token credentials, then
/// username and password together.
pub fn resolve(config: &ServiceConfig, target_url: &str) -> AuthStrategy {
    resolve_with_provider(config, target_url, false)
}

/// Like [`resolve`], with `has_provider` set when a token provider is
/// already installed. Such a provider counts as bearer credentials.
pub fn resolve_with_provider(config: &ServiceConfig, target_url: &str, has_provider: bool) -> AuthStrategy {
    if let Some(key) = &config.api_key {
        return AuthStrategy::ApiKeyQueryParam {
            param: api_key_param(target_url),
            key: key.clone(),
        };
    }

    if config.has_token_credentials() || has_provider {
        return AuthStrategy::BearerToken(config.token_credentials());
    }

    match (&config.username, &config.password) {
        (Some(username), Some(password)) => AuthStrategy::BasicAuth {
            username: username.clone(),
            password: password.clone(),
        },
        _ => AuthStrategy::None,
    }
}

/// Query parameter name for the API key at `target_url`
pub fn api_key_param(target_url: &str) -> &'static str {
    if target_url.starts_with(LEGACY_GATEWAY_PREFIX) {
        "apikey"
    } else {
        "api_key"
    }
}
