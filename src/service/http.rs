//! HTTP transport for service API calls

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{redirect, Client};
use std::time::Duration;

use super::error::ServiceError;
use super::request::{CanonicalRequest, Payload};
use super::response::DetailedResponse;

/// Fixed per-operation timeouts. A transfer that keeps making progress is
/// never cut off; only a connect or a single read that stalls this long is.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

const MAX_REDIRECTS: usize = 10;

/// HTTP client wrapper for service API calls
#[derive(Clone)]
pub struct ServiceHttpClient {
    client: Client,
}

impl ServiceHttpClient {
    /// Create a new HTTP client that follows redirects
    pub fn new() -> Result<Self, ServiceError> {
        Self::with_timeouts(CONNECT_TIMEOUT, READ_TIMEOUT)
    }

    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self { client })
    }

    /// Issue a canonical request. `default_headers` sit beneath the request's
    /// own headers; `basic_auth` is attached by the client, not as a caller header.
    pub async fn execute(
        &self,
        request: CanonicalRequest,
        default_headers: &HeaderMap,
        basic_auth: Option<(&str, &str)>,
    ) -> Result<DetailedResponse, ServiceError> {
        let url = url::Url::parse(&request.url)?;
        let mut headers = merge_headers(default_headers, &request.headers);
        if basic_auth.is_some() {
            headers.remove(AUTHORIZATION);
        }

        let mut builder = self
            .client
            .request(request.method, url)
            .headers(headers)
            .query(&request.params);

        if let Some((username, password)) = basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }

        builder = match request.payload {
            Payload::None => builder,
            Payload::Body(text) => builder.body(text),
            Payload::Form(fields) => builder.form(&fields),
        };

        let response = builder.send().await?;
        DetailedResponse::read(response).await
    }
}

/// Client-wide defaults overlaid by per-request headers
pub fn merge_headers(defaults: &HeaderMap, request: &HeaderMap) -> HeaderMap {
    let mut headers = defaults.clone();
    for name in request.keys() {
        headers.remove(name);
    }
    for (name, value) in request {
        headers.append(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_request_headers_override_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert("user-agent", HeaderValue::from_static("cloudsvc-test"));
        defaults.insert("x-watson-learning-opt-out", HeaderValue::from_static("true"));
        let mut request = HeaderMap::new();
        request.insert("x-watson-learning-opt-out", HeaderValue::from_static("false"));

        let headers = merge_headers(&defaults, &request);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["user-agent"], "cloudsvc-test");
        assert_eq!(headers["x-watson-learning-opt-out"], "false");
    }
}
