//! Request Normalization
//!
//! Callers describe a call loosely with a [`RequestSpec`]: a structured JSON
//! body, a raw body (text or fields), form fields, headers and params that
//! may contain nulls. [`normalize`] turns that into one [`CanonicalRequest`]
//! with a single payload and no nulls.

use reqwest::header::{self, AsHeaderName, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::error::ServiceError;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const ACCEPT: &str = "Accept";
pub const APPLICATION_JSON: &str = "application/json";

/// The shapes a request body can take
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BodyRepresentation {
    #[default]
    Empty,
    /// Pre-serialized text, sent verbatim
    Raw(String),
    /// JSON object fields
    Structured(Map<String, Value>),
    /// Form submission fields
    Form(Map<String, Value>),
}

/// Loose description of one call
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    /// Appended verbatim to the service URL
    pub path: String,
    /// Must be a JSON object when present
    pub headers: Option<Value>,
    /// Must be a JSON object when present
    pub params: Option<Value>,
    /// Structured body. Wins over `data` fields on key collision.
    pub json: Map<String, Value>,
    /// Raw body. `Form` fields are treated as form fields.
    pub data: BodyRepresentation,
    pub form: Option<Map<String, Value>>,
    pub accept_json: bool,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: None,
            params: None,
            json: Map::new(),
            data: BodyRepresentation::Empty,
            form: None,
            accept_json: false,
        }
    }

    /// Add a header. A non-object `headers` is left as is for `normalize` to reject.
    pub fn header(mut self, name: &str, value: impl Into<Value>) -> Self {
        insert_entry(&mut self.headers, name, value.into());
        self
    }

    pub fn query(mut self, name: &str, value: impl Into<Value>) -> Self {
        insert_entry(&mut self.params, name, value.into());
        self
    }

    pub fn json(mut self, body: Map<String, Value>) -> Self {
        self.json = body;
        self
    }

    pub fn data(mut self, data: BodyRepresentation) -> Self {
        self.data = data;
        self
    }

    pub fn form_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.form
            .get_or_insert_with(Map::new)
            .insert(name.to_string(), value.into());
        self
    }

    pub fn accept_json(mut self) -> Self {
        self.accept_json = true;
        self
    }
}

fn insert_entry(slot: &mut Option<Value>, name: &str, value: Value) {
    if matches!(slot, None | Some(Value::Null)) {
        *slot = Some(Value::Object(Map::new()));
    }
    if let Some(Value::Object(map)) = slot {
        map.insert(name.to_string(), value);
    }
}

/// Wire payload of a canonical request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    Body(String),
    Form(BTreeMap<String, String>),
}

/// A fully normalized request, ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub method: Method,
    /// Service URL + path
    pub url: String,
    pub headers: HeaderMap,
    pub params: BTreeMap<String, String>,
    pub payload: Payload,
}

impl CanonicalRequest {
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

impl From<CanonicalRequest> for RequestSpec {
    /// Re-describe a canonical request. Normalizing the result against an
    /// empty service URL yields the same request.
    fn from(request: CanonicalRequest) -> Self {
        let (data, form) = match request.payload {
            Payload::None => (BodyRepresentation::Empty, None),
            Payload::Body(text) => (BodyRepresentation::Raw(text), None),
            Payload::Form(fields) => (BodyRepresentation::Empty, Some(to_value_map(fields))),
        };

        Self {
            method: request.method,
            path: request.url,
            headers: Some(Value::Object(header_value_map(&request.headers))),
            params: Some(Value::Object(to_value_map(request.params))),
            json: Map::new(),
            data,
            form,
            accept_json: false,
        }
    }
}

fn to_value_map(map: BTreeMap<String, String>) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (k, Value::String(v))).collect()
}

fn header_value_map(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            (name.as_str().to_string(), Value::String(value))
        })
        .collect()
}

/// Normalize a call description against the service URL.
///
/// Fails with [`ServiceError::InvalidArgument`] when headers or params are
/// not objects, hold nested values, or a header is not valid on the wire.
pub fn normalize(spec: RequestSpec, base_url: &str) -> Result<CanonicalRequest, ServiceError> {
    let raw_headers = as_object(spec.headers, "headers")?;
    let raw_params = as_object(spec.params, "params")?;

    // An explicit Content-Type, even a null one, suppresses the JSON default
    let has_content_type = raw_headers
        .keys()
        .any(|key| key.eq_ignore_ascii_case(CONTENT_TYPE));

    let mut headers = HeaderMap::new();
    for (name, value) in raw_headers {
        if let Some(value) = scalar_to_string(&name, value, "header")? {
            let (name, value) = header_entry(&name, &value)?;
            headers.insert(name, value);
        }
    }

    let mut params = BTreeMap::new();
    for (name, value) in raw_params {
        if let Some(value) = scalar_to_string(&name, value, "param")? {
            params.insert(name, value);
        }
    }

    if spec.accept_json {
        headers.insert(header::ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
    }
    if !has_content_type {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }

    let payload = match merge_body(spec.json, spec.data, spec.form) {
        BodyRepresentation::Empty => Payload::None,
        BodyRepresentation::Raw(text) => Payload::Body(text),
        BodyRepresentation::Structured(fields) => {
            Payload::Body(serde_json::to_string(&Value::Object(fields))?)
        }
        BodyRepresentation::Form(fields) => {
            let mut form = BTreeMap::new();
            for (name, value) in fields {
                if let Some(value) = scalar_to_string(&name, value, "form field")? {
                    form.insert(name, value);
                }
            }
            Payload::Form(form)
        }
    };

    if matches!(payload, Payload::None | Payload::Form(_)) {
        headers.remove(header::CONTENT_TYPE);
    }

    Ok(CanonicalRequest {
        method: spec.method,
        url: format!("{}{}", base_url, spec.path),
        headers,
        params,
        payload,
    })
}

/// Resolve the structured body, raw body and form fields into one body.
///
/// Form fields win outright. Otherwise raw fields are merged beneath the
/// structured body, and non-empty raw text (or an empty structured body)
/// passes the raw body through unchanged. Null fields are dropped.
pub fn merge_body(
    json: Map<String, Value>,
    data: BodyRepresentation,
    form: Option<Map<String, Value>>,
) -> BodyRepresentation {
    let (data, form) = match data {
        BodyRepresentation::Form(mut fields) => {
            fields.extend(form.unwrap_or_default());
            (BodyRepresentation::Empty, Some(fields))
        }
        data => (data, form),
    };

    if let Some(mut fields) = form {
        if !json.is_empty() || data != BodyRepresentation::Empty {
            tracing::warn!("Request has both form fields and a body; sending form fields only");
        }
        strip_nulls(&mut fields);
        return BodyRepresentation::Form(fields);
    }

    let data = match data {
        BodyRepresentation::Structured(mut fields) => {
            strip_nulls(&mut fields);
            BodyRepresentation::Structured(fields)
        }
        data => data,
    };

    let mut json = json;
    if let BodyRepresentation::Structured(fields) = &data {
        let mut merged = fields.clone();
        merged.extend(json);
        json = merged;
    }

    let raw_text = matches!(&data, BodyRepresentation::Raw(text) if !text.is_empty());
    let mut body = if json.is_empty() || raw_text {
        data
    } else {
        BodyRepresentation::Structured(json)
    };

    if let BodyRepresentation::Structured(fields) = &mut body {
        strip_nulls(fields);
    }
    body
}

fn strip_nulls(fields: &mut Map<String, Value>) {
    fields.retain(|_, value| !value.is_null());
}

fn as_object(value: Option<Value>, what: &str) -> Result<Map<String, Value>, ServiceError> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(ServiceError::InvalidArgument(format!(
            "{} must be an object, got {}",
            what,
            type_name(&other)
        ))),
    }
}

fn scalar_to_string(name: &str, value: Value, what: &str) -> Result<Option<String>, ServiceError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(ServiceError::InvalidArgument(format!(
            "{} '{}' must be a scalar, got {}",
            what,
            name,
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a header name and value, rejecting anything not valid on the wire
pub(crate) fn header_entry(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ServiceError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ServiceError::InvalidArgument(format!("invalid header name '{}'", name)))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| ServiceError::InvalidArgument(format!("invalid value for header '{}'", name)))?;
    Ok((header_name, header_value))
}
