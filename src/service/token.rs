//! Bearer Token Providers
//!
//! A [`TokenProvider`] hands out a currently valid access token for the
//! `Authorization: Bearer` header. [`IamTokenManager`] obtains tokens from an
//! IAM token endpoint in exchange for an API key and refreshes them as they
//! age, or passes through a caller-managed access token.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;

use super::error::ServiceError;
use super::http::{CONNECT_TIMEOUT, READ_TIMEOUT};
use super::response::{classify, DetailedResponse, ServiceResult};

/// Default IAM token endpoint
pub const DEFAULT_IAM_URL: &str = "https://iam.bluemix.net/identity/token";

/// Client credentials IAM expects on token calls (`bx:bx`)
const IAM_CLIENT_AUTHORIZATION: &str = "Basic Yng6Yng=";

const GRANT_TYPE_API_KEY: &str = "urn:ibm:params:oauth:grant-type:apikey";
const GRANT_TYPE_REFRESH: &str = "refresh_token";
const RESPONSE_TYPE: &str = "cloud_iam";

/// Percentage of a token's lifetime after which it is refreshed
const TOKEN_REFRESH_PERCENT: i64 = 80;

/// Refresh tokens stay usable this long past the access token's expiration
const REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Source of bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A token valid for the next request. May perform a network round trip.
    async fn current_token(&self) -> Result<String, ServiceError>;

    /// Replace the fields present in `credentials`, keeping the others
    fn reconfigure(&mut self, credentials: TokenCredentials);
}

/// Inputs for a token provider. Each field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenCredentials {
    /// API key exchanged for tokens
    pub api_key: Option<String>,
    /// Caller-managed access token, used verbatim
    pub access_token: Option<String>,
    /// Token endpoint override
    pub url: Option<String>,
}

/// Token document returned by the IAM endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Unix timestamp of expiry
    pub expiration: i64,
}

impl TokenInfo {
    /// Access token is due for refresh once most of its lifetime has passed.
    /// Server-supplied values saturate, so an absurd lifetime reads as expired.
    pub fn is_token_expired(&self, now: i64) -> bool {
        let margin = self.expires_in.saturating_mul(100 - TOKEN_REFRESH_PERCENT) / 100;
        self.expiration.saturating_sub(margin) < now
    }

    pub fn is_refresh_token_expired(&self, now: i64) -> bool {
        let lifetime = i64::try_from(REFRESH_TOKEN_LIFETIME.as_secs()).unwrap_or(i64::MAX);
        self.expiration.saturating_add(lifetime) < now
    }
}

/// IAM token manager with token caching
pub struct IamTokenManager {
    credentials: TokenCredentials,
    client: Client,
    token_cache: RwLock<Option<TokenInfo>>,
}

impl IamTokenManager {
    pub fn new(credentials: TokenCredentials) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()?;

        Ok(Self {
            credentials,
            client,
            token_cache: RwLock::new(None),
        })
    }

    pub fn credentials(&self) -> &TokenCredentials {
        &self.credentials
    }

    fn token_url(&self) -> &str {
        self.credentials.url.as_deref().unwrap_or(DEFAULT_IAM_URL)
    }

    /// Exchange the API key for a new token
    async fn request_token(&self) -> Result<TokenInfo, ServiceError> {
        let Some(api_key) = self.credentials.api_key.as_deref() else {
            return Err(ServiceError::Token(
                "no IAM API key or access token configured".to_string(),
            ));
        };
        tracing::debug!("Requesting IAM token from {}", self.token_url());

        self.token_call(&[
            ("grant_type", GRANT_TYPE_API_KEY),
            ("apikey", api_key),
            ("response_type", RESPONSE_TYPE),
        ])
        .await
    }

    /// Trade a refresh token for a new token
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenInfo, ServiceError> {
        tracing::debug!("Refreshing IAM token at {}", self.token_url());

        self.token_call(&[
            ("grant_type", GRANT_TYPE_REFRESH),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_call(&self, form: &[(&str, &str)]) -> Result<TokenInfo, ServiceError> {
        let response = self
            .client
            .post(self.token_url())
            .header(reqwest::header::AUTHORIZATION, IAM_CLIENT_AUTHORIZATION)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let response = DetailedResponse::read(response).await?;
        match classify(response) {
            ServiceResult::Success(response) => Ok(serde_json::from_str(&response.body)?),
            ServiceResult::Failure(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl TokenProvider for IamTokenManager {
    async fn current_token(&self) -> Result<String, ServiceError> {
        if let Some(token) = &self.credentials.access_token {
            return Ok(token.clone());
        }

        let now = chrono::Utc::now().timestamp();

        {
            let cache = self.token_cache.read().await;
            if let Some(info) = cache.as_ref() {
                if !info.is_token_expired(now) {
                    return Ok(info.access_token.clone());
                }
                tracing::debug!("Cached IAM token expired, fetching new token");
            }
        }

        let mut cache = self.token_cache.write().await;
        let info = match cache.as_ref() {
            Some(info) if !info.is_token_expired(now) => return Ok(info.access_token.clone()),
            Some(info) if !info.is_refresh_token_expired(now) => {
                self.refresh_token(&info.refresh_token).await?
            }
            _ => self.request_token().await?,
        };

        let token = info.access_token.clone();
        *cache = Some(info);
        Ok(token)
    }

    fn reconfigure(&mut self, credentials: TokenCredentials) {
        // Tokens issued for another key or endpoint must not be reused
        if credentials.api_key.is_some() || credentials.url.is_some() {
            *self.token_cache.get_mut() = None;
        }
        if credentials.api_key.is_some() {
            self.credentials.api_key = credentials.api_key;
        }
        if credentials.access_token.is_some() {
            self.credentials.access_token = credentials.access_token;
        }
        if credentials.url.is_some() {
            self.credentials.url = credentials.url;
        }
    }
}
