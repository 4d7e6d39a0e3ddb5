//! Credential Discovery
//!
//! Environment-provided catalogs mapping a service name to a credentials
//! entry. The client consults one at construction time only.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Environment variable holding the Cloud Foundry service catalog
pub const VCAP_SERVICES_ENV: &str = "VCAP_SERVICES";

/// A catalog of service credentials
pub trait Discovery {
    /// Credentials entry for `service_name`, if the catalog has one
    fn lookup(&self, service_name: &str) -> Option<Map<String, Value>>;
}

/// Catalog in the `VCAP_SERVICES` format:
/// `{"<service>": [{"credentials": {...}}, ...]}`. The first instance wins.
#[derive(Debug, Clone, Default)]
pub struct VcapServices {
    raw: Option<String>,
}

impl VcapServices {
    pub fn from_env() -> Self {
        Self {
            raw: std::env::var(VCAP_SERVICES_ENV).ok(),
        }
    }

    pub fn from_json(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
        }
    }
}

impl Discovery for VcapServices {
    fn lookup(&self, service_name: &str) -> Option<Map<String, Value>> {
        let raw = self.raw.as_deref()?;
        let services: Value = match serde_json::from_str(raw) {
            Ok(services) => services,
            Err(e) => {
                tracing::warn!("Ignoring malformed {}: {}", VCAP_SERVICES_ENV, e);
                return None;
            }
        };

        services
            .get(service_name)?
            .get(0)?
            .get("credentials")?
            .as_object()
            .cloned()
    }
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: HashMap<String, Map<String, Value>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, service_name: &str, credentials: Map<String, Value>) -> Self {
        self.entries.insert(service_name.to_string(), credentials);
        self
    }
}

impl Discovery for StaticCatalog {
    fn lookup(&self, service_name: &str) -> Option<Map<String, Value>> {
        self.entries.get(service_name).cloned()
    }
}
