//! Error types for service client operations.

use thiserror::Error;

use super::response::ApiError;

/// Errors that can occur while resolving, dispatching or classifying a call.
///
/// - **Caller errors**: [`InvalidArgument`](ServiceError::InvalidArgument),
///   [`Url`](ServiceError::Url), [`Json`](ServiceError::Json)
/// - **Network errors**: [`Transport`](ServiceError::Transport)
/// - **Server errors**: [`Api`](ServiceError::Api), [`Token`](ServiceError::Token)
///
/// Nothing is retried; every variant reaches the caller as-is.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed headers, params or options. Raised before any network call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection, DNS, TLS or timeout failure from the transport.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a status outside 200-299.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A bearer token could not be produced.
    #[error("Token error: {0}")]
    Token(String),

    /// The base URL plus path did not form a valid URL.
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Failed to serialize or deserialize JSON data.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    /// HTTP status of an API failure, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Api(err) => Some(err.status),
            _ => None,
        }
    }
}
