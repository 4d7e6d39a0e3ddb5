//! Service Client
//!
//! Owns a service's configuration, its token provider and the transport,
//! and dispatches requests with exactly one authentication strategy applied.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde_json::Value;

use crate::config::{ServiceConfig, ServiceOptions};

use super::auth::{self, AuthStrategy};
use super::discovery::{Discovery, VcapServices};
use super::error::ServiceError;
use super::http::ServiceHttpClient;
use super::request::{self, header_entry, CanonicalRequest, RequestSpec};
use super::response::{classify, DetailedResponse, ServiceResult};
use super::token::{IamTokenManager, TokenCredentials, TokenProvider};

/// Main service client
pub struct ServiceClient {
    config: ServiceConfig,
    http: ServiceHttpClient,
    token_provider: Option<Box<dyn TokenProvider>>,
}

impl ServiceClient {
    /// Create a client, consulting `VCAP_SERVICES` when discovery is enabled
    pub fn new(options: ServiceOptions) -> Result<Self, ServiceError> {
        Self::with_discovery(options, &VcapServices::from_env())
    }

    /// Create a client with an injected discovery catalog
    pub fn with_discovery(
        options: ServiceOptions,
        discovery: &dyn Discovery,
    ) -> Result<Self, ServiceError> {
        let mut config = ServiceConfig::from_options(&options);

        if options.use_vcap_services {
            if let Some(name) = options.vcap_services_name.as_deref() {
                if let Some(entry) = discovery.lookup(name) {
                    tracing::debug!("Using discovered credentials for service {}", name);
                    config.merge_discovered(&entry);
                }
            }
        }

        if config.url.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "a service url is required".to_string(),
            ));
        }

        let token_provider: Option<Box<dyn TokenProvider>> = if config.has_token_credentials() {
            Some(Box::new(IamTokenManager::new(config.token_credentials())?))
        } else {
            None
        };

        Ok(Self {
            config,
            http: ServiceHttpClient::new()?,
            token_provider,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn set_url(&mut self, url: &str) {
        self.config.url = url.to_string();
    }

    pub fn set_username_and_password(&mut self, username: &str, password: &str) {
        self.config.username = Some(username.to_string());
        self.config.password = Some(password.to_string());
    }

    pub fn set_api_key(&mut self, api_key: &str) {
        self.config.api_key = Some(api_key.to_string());
    }

    /// Use a caller-managed IAM access token from now on
    pub fn set_iam_access_token(&mut self, access_token: &str) -> Result<(), ServiceError> {
        self.config.iam_access_token = Some(access_token.to_string());
        self.reconfigure_token_provider(TokenCredentials {
            access_token: Some(access_token.to_string()),
            ..Default::default()
        })
    }

    pub fn set_iam_api_key(&mut self, api_key: &str) -> Result<(), ServiceError> {
        self.config.iam_api_key = Some(api_key.to_string());
        self.reconfigure_token_provider(TokenCredentials {
            api_key: Some(api_key.to_string()),
            ..Default::default()
        })
    }

    /// Update the bearer-token fields present in `credentials`. The existing
    /// provider is reconfigured in place, keeping its cached token where valid.
    pub fn set_token_credentials(&mut self, credentials: TokenCredentials) -> Result<(), ServiceError> {
        if credentials.api_key.is_some() {
            self.config.iam_api_key = credentials.api_key.clone();
        }
        if credentials.access_token.is_some() {
            self.config.iam_access_token = credentials.access_token.clone();
        }
        if credentials.url.is_some() {
            self.config.iam_url = credentials.url.clone();
        }
        self.reconfigure_token_provider(credentials)
    }

    /// Use a custom token provider for bearer authentication. An installed
    /// provider counts as bearer credentials when resolving a strategy.
    pub fn set_token_provider(&mut self, provider: Box<dyn TokenProvider>) {
        self.token_provider = Some(provider);
    }

    fn reconfigure_token_provider(&mut self, credentials: TokenCredentials) -> Result<(), ServiceError> {
        match self.token_provider.as_mut() {
            Some(provider) => provider.reconfigure(credentials),
            None => self.token_provider = Some(Box::new(IamTokenManager::new(credentials)?)),
        }
        Ok(())
    }

    /// Add headers sent with every request. `headers` must be a JSON object;
    /// null values are skipped.
    pub fn add_default_headers(&mut self, headers: &Value) -> Result<(), ServiceError> {
        let Value::Object(headers) = headers else {
            return Err(ServiceError::InvalidArgument(
                "default headers must be an object".to_string(),
            ));
        };

        for (name, value) in headers {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                Value::Bool(_) | Value::Number(_) => value.to_string(),
                _ => {
                    return Err(ServiceError::InvalidArgument(format!(
                        "default header '{}' must be a scalar",
                        name
                    )))
                }
            };
            let (name, value) = header_entry(name, &value)?;
            self.config.default_headers.insert(name, value);
        }
        Ok(())
    }

    /// The strategy a request to `path` would use right now
    pub fn auth_strategy(&self, path: &str) -> AuthStrategy {
        auth::resolve_with_provider(
            &self.config,
            &format!("{}{}", self.config.url, path),
            self.token_provider.is_some(),
        )
    }

    /// Normalize and send a call description
    pub async fn request(&self, spec: RequestSpec) -> Result<DetailedResponse, ServiceError> {
        let request = request::normalize(spec, &self.config.url)?;
        self.send(request).await
    }

    /// Send a canonical request, failing with [`ServiceError::Api`] outside 2xx
    pub async fn send(&self, request: CanonicalRequest) -> Result<DetailedResponse, ServiceError> {
        self.dispatch(request).await?.into_result()
    }

    /// Send a canonical request and return the classified outcome
    pub async fn dispatch(&self, mut request: CanonicalRequest) -> Result<ServiceResult, ServiceError> {
        // Snapshot so the whole call sees one credential state
        let config = self.config.clone();
        let strategy = auth::resolve_with_provider(&config, &request.url, self.token_provider.is_some());

        tracing::debug!("{} {} (auth: {})", request.method, request.url, strategy.kind());

        let mut basic_auth = None;
        match &strategy {
            AuthStrategy::None => {}
            AuthStrategy::ApiKeyQueryParam { param, key } => {
                request.params.insert(param.to_string(), key.clone());
            }
            AuthStrategy::BearerToken(_) => {
                let Some(provider) = self.token_provider.as_ref() else {
                    return Err(ServiceError::Token(
                        "bearer credentials set but no token provider configured".to_string(),
                    ));
                };
                let token = provider.current_token().await?;
                let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                    ServiceError::Token("access token is not a valid header value".to_string())
                })?;
                request.headers.insert(AUTHORIZATION, value);
            }
            AuthStrategy::BasicAuth { username, password } => {
                basic_auth = Some((username.as_str(), password.as_str()));
            }
        }

        let response = self
            .http
            .execute(request, &config.default_headers, basic_auth)
            .await?;
        Ok(classify(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::discovery::StaticCatalog;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn options() -> ServiceOptions {
        ServiceOptions {
            url: Some("https://api.example.com".into()),
            use_vcap_services: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_url_is_required() {
        let err = ServiceClient::with_discovery(
            ServiceOptions {
                url: None,
                ..options()
            },
            &StaticCatalog::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn test_discovery_supplies_url_and_credentials() {
        let catalog = StaticCatalog::new().with_entry(
            "assistant",
            json!({"url": "https://discovered.example.com", "username": "u", "password": "p"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let client = ServiceClient::with_discovery(
            ServiceOptions {
                url: None,
                vcap_services_name: Some("assistant".into()),
                use_vcap_services: true,
                ..Default::default()
            },
            &catalog,
        )
        .unwrap();

        assert_eq!(client.url(), "https://discovered.example.com");
        assert_eq!(client.auth_strategy("/v1/x").kind(), "basic");
    }

    #[test]
    fn test_discovery_disabled_ignores_catalog() {
        let catalog = StaticCatalog::new().with_entry(
            "assistant",
            json!({"apikey": "k"}).as_object().cloned().unwrap(),
        );
        let client = ServiceClient::with_discovery(
            ServiceOptions {
                vcap_services_name: Some("assistant".into()),
                ..options()
            },
            &catalog,
        )
        .unwrap();

        assert_eq!(client.auth_strategy("/v1/x"), AuthStrategy::None);
    }

    #[test]
    fn test_setters_change_strategy() {
        let mut client = ServiceClient::with_discovery(options(), &StaticCatalog::new()).unwrap();
        assert_eq!(client.auth_strategy("/v1/x"), AuthStrategy::None);

        client.set_username_and_password("user", "pass");
        assert_eq!(client.auth_strategy("/v1/x").kind(), "basic");

        client.set_iam_api_key("iam-key").unwrap();
        assert_eq!(client.auth_strategy("/v1/x").kind(), "bearer");
        assert!(client.token_provider.is_some());

        client.set_api_key("k1");
        assert_eq!(
            client.auth_strategy("/v1/x"),
            AuthStrategy::ApiKeyQueryParam {
                param: "api_key",
                key: "k1".into()
            }
        );
    }

    #[test]
    fn test_set_url_changes_legacy_param() {
        let mut client = ServiceClient::with_discovery(
            ServiceOptions {
                api_key: Some("k1".into()),
                ..options()
            },
            &StaticCatalog::new(),
        )
        .unwrap();
        client.set_url("https://gateway-a.watsonplatform.net/calls");

        assert_eq!(
            client.auth_strategy("/url/URLGetRankedKeywords"),
            AuthStrategy::ApiKeyQueryParam {
                param: "apikey",
                key: "k1".into()
            }
        );
    }

    #[test]
    fn test_add_default_headers() {
        let mut client = ServiceClient::with_discovery(options(), &StaticCatalog::new()).unwrap();
        client
            .add_default_headers(&json!({"X-Custom": "1", "X-Count": 2, "X-Skip": null}))
            .unwrap();

        let headers = &client.config().default_headers;
        assert_eq!(headers["x-custom"], "1");
        assert_eq!(headers["x-count"], "2");
        assert!(!headers.contains_key("x-skip"));

        let err = client.add_default_headers(&json!(["X-Custom"])).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));

        let err = client.add_default_headers(&json!({"bad name": "1"})).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    /// Records every reconfigure call it receives
    struct RecordingProvider {
        seen: Arc<Mutex<Vec<TokenCredentials>>>,
    }

    #[async_trait]
    impl TokenProvider for RecordingProvider {
        async fn current_token(&self) -> Result<String, ServiceError> {
            Ok("recorded".to_string())
        }

        fn reconfigure(&mut self, credentials: TokenCredentials) {
            self.seen.lock().unwrap().push(credentials);
        }
    }

    #[test]
    fn test_custom_provider_selects_bearer() {
        let mut client = ServiceClient::with_discovery(options(), &StaticCatalog::new()).unwrap();
        client.set_token_provider(Box::new(RecordingProvider {
            seen: Arc::default(),
        }));
        assert_eq!(client.auth_strategy("/v1/x").kind(), "bearer");

        // An API key still outranks the provider
        client.set_api_key("k1");
        assert_eq!(client.auth_strategy("/v1/x").kind(), "api_key");
    }

    #[tokio::test]
    async fn test_set_token_credentials_reconfigures_existing_provider() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut client = ServiceClient::with_discovery(options(), &StaticCatalog::new()).unwrap();
        client.set_token_provider(Box::new(RecordingProvider { seen: seen.clone() }));

        let credentials = TokenCredentials {
            api_key: Some("iam-key".into()),
            ..Default::default()
        };
        client.set_token_credentials(credentials.clone()).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![credentials]);
        let provider = client.token_provider.as_ref().unwrap();
        assert_eq!(provider.current_token().await.unwrap(), "recorded");
        assert_eq!(client.config().iam_api_key.as_deref(), Some("iam-key"));
    }

    #[test]
    fn test_set_token_credentials_keeps_absent_fields() {
        let mut client = ServiceClient::with_discovery(
            ServiceOptions {
                iam_url: Some("https://iam.example.com/token".into()),
                ..options()
            },
            &StaticCatalog::new(),
        )
        .unwrap();

        client
            .set_token_credentials(TokenCredentials {
                access_token: Some("tok".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            client.config().token_credentials(),
            TokenCredentials {
                api_key: None,
                access_token: Some("tok".into()),
                url: Some("https://iam.example.com/token".into()),
            }
        );
    }
}
