//! cloudsvc
//!
//! Client core for cloud service REST APIs. Resolves credentials from the
//! configured sources, normalizes call descriptions into a single wire
//! request, dispatches it and classifies the response.

pub mod config;
pub mod service;

pub use config::{ServiceConfig, ServiceOptions};
pub use service::auth::AuthStrategy;
pub use service::client::ServiceClient;
pub use service::error::ServiceError;
pub use service::request::{BodyRepresentation, CanonicalRequest, Payload, RequestSpec};
pub use service::response::{ApiError, DetailedResponse, ServiceResult};
