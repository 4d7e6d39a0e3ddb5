//! Service API interaction module
//!
//! This module holds the request pipeline shared by every service client:
//! credentials, request normalization, transport and response handling.
//!
//! # Module Structure
//!
//! - [`auth`] - Credential resolution into a single active strategy
//! - [`client`] - Service client owning config, token provider and transport
//! - [`discovery`] - Environment-provided credential catalogs
//! - [`error`] - Error type for the whole pipeline
//! - [`http`] - HTTP transport over reqwest
//! - [`request`] - Call description and normalization
//! - [`response`] - Detailed responses and status classification
//! - [`token`] - Bearer token providers (IAM token exchange)
//!
//! # Example
//!
//! ```ignore
//! use cloudsvc::{RequestSpec, ServiceClient, ServiceOptions};
//! use reqwest::Method;
//!
//! async fn example() -> Result<(), cloudsvc::ServiceError> {
//!     let client = ServiceClient::new(ServiceOptions {
//!         url: Some("https://api.example.com".into()),
//!         api_key: Some("k1".into()),
//!         ..Default::default()
//!     })?;
//!     let response = client
//!         .request(RequestSpec::new(Method::GET, "/v1/x").accept_json())
//!         .await?;
//!     println!("{}", response.status);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod discovery;
pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod token;
