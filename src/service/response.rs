//! Response Classification
//!
//! Maps a raw HTTP response to success or a typed [`ApiError`] by status
//! alone: 200-299 is success, anything else is a failure.

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use thiserror::Error;

use super::error::ServiceError;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Headers that carry the service-side transaction id
const TRANSACTION_ID_HEADERS: &[&str] = &["X-DP-Watson-Tran-ID", "X-Global-Transaction-Id"];

/// Error document fields that may hold the human-readable message, in order
const MESSAGE_FIELDS: &[&str] = &["error", "message", "errorMessage", "error_message", "description"];

/// Error document fields that are not carried over into [`ApiError::info`]
const CONSUMED_FIELDS: &[&str] = &[
    "error",
    "message",
    "errorMessage",
    "error_message",
    "description",
    "code",
    "error_code",
];

/// Status, headers and body of a completed call
#[derive(Debug, Clone)]
pub struct DetailedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl DetailedResponse {
    /// Drain a reqwest response
    pub async fn read(response: reqwest::Response) -> Result<Self, ServiceError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(Self { status, headers, body })
    }

    /// Body parsed as JSON, `Value::Null` when empty
    pub fn json(&self) -> Result<Value, ServiceError> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// A non-2xx answer from the service
#[derive(Debug, Clone, Error)]
#[error("Error: {message}, Code: {status}")]
pub struct ApiError {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    /// Best-effort message from the body, else a generic one for the status
    pub message: String,
    pub transaction_id: Option<String>,
    /// Remaining fields of a JSON error document
    pub info: Option<Value>,
}

impl ApiError {
    pub fn from_response(response: DetailedResponse) -> Self {
        let transaction_id = TRANSACTION_ID_HEADERS
            .iter()
            .find_map(|name| response.headers.get(*name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let (message, info) = extract_message(response.status, &response.body);

        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            message,
            transaction_id,
            info,
        }
    }
}

/// Outcome of a call
#[derive(Debug, Clone)]
pub enum ServiceResult {
    Success(DetailedResponse),
    Failure(ApiError),
}

impl ServiceResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ServiceResult::Success(_))
    }

    pub fn status(&self) -> u16 {
        match self {
            ServiceResult::Success(response) => response.status,
            ServiceResult::Failure(err) => err.status,
        }
    }

    pub fn into_result(self) -> Result<DetailedResponse, ServiceError> {
        match self {
            ServiceResult::Success(response) => Ok(response),
            ServiceResult::Failure(err) => Err(ServiceError::Api(err)),
        }
    }
}

/// Classify by status code alone
pub fn classify(response: DetailedResponse) -> ServiceResult {
    if (200..=299).contains(&response.status) {
        return ServiceResult::Success(response);
    }

    // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
    tracing::error!(
        "API error: {} - {}",
        response.status,
        sanitize_for_log(&response.body)
    );
    ServiceResult::Failure(ApiError::from_response(response))
}

/// Message for a failed call: a JSON message field, else the raw text,
/// else a generic message for the status.
fn extract_message(status: u16, body: &str) -> (String, Option<Value>) {
    if let Ok(Value::Object(document)) = serde_json::from_str::<Value>(body) {
        if let Some(message) = MESSAGE_FIELDS
            .iter()
            .find_map(|field| document.get(*field).and_then(message_text))
        {
            return (message, remaining_info(&document));
        }
    }

    let text = body.trim();
    if !text.is_empty() {
        return (text.to_string(), None);
    }

    (generic_message(status).to_string(), None)
}

/// Accepts `"text"` or `{"message": "text"}`
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(inner) => inner.get("message").and_then(message_text),
        _ => None,
    }
}

fn remaining_info(document: &Map<String, Value>) -> Option<Value> {
    let info: Map<String, Value> = document
        .iter()
        .filter(|(key, _)| !CONSUMED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if info.is_empty() {
        None
    } else {
        Some(Value::Object(info))
    }
}

/// Generic message keyed to the status code
pub fn generic_message(status: u16) -> &'static str {
    match status {
        400 => "Bad request. Check your parameters.",
        401 => "Unauthorized: Access is denied due to invalid credentials.",
        403 => "Forbidden: Service refused the request.",
        404 => "Not found: Requested resource or endpoint does not exist.",
        409 => "Conflict: The resource may already exist or be in use.",
        413 => "Payload too large.",
        415 => "Unsupported media type.",
        429 => "Too many requests. Please try again later.",
        500 => "Internal server error.",
        502 | 503 | 504 => "Service temporarily unavailable. Please try again.",
        _ => "Request failed.",
    }
}

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}
