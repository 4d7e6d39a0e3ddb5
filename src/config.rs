//! Configuration Management
//!
//! Service configuration held by a client, the options it is built from,
//! and the persisted profile used by the command-line tool.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::service::token::TokenCredentials;

/// Header sent when the caller opts out of request logging for service learning
pub const LEARNING_OPT_OUT_HEADER: &str = "x-watson-learning-opt-out";

/// Constructor input for a service client
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub iam_api_key: Option<String>,
    pub iam_access_token: Option<String>,
    pub iam_url: Option<String>,
    /// Catalog entry to consult when discovery is enabled
    pub vcap_services_name: Option<String>,
    pub use_vcap_services: bool,
    pub x_watson_learning_opt_out: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            username: None,
            password: None,
            iam_api_key: None,
            iam_access_token: None,
            iam_url: None,
            vcap_services_name: None,
            use_vcap_services: true,
            x_watson_learning_opt_out: false,
        }
    }
}

/// Credential and endpoint state of one service client.
///
/// Several strategies may be stored at once; only one is applied per
/// request, see [`crate::service::auth::resolve`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub iam_api_key: Option<String>,
    pub iam_access_token: Option<String>,
    pub iam_url: Option<String>,
    pub learning_opt_out: bool,
    pub default_headers: HeaderMap,
}

impl ServiceConfig {
    /// Build from explicit options. The URL may still be empty here.
    pub fn from_options(options: &ServiceOptions) -> Self {
        let mut config = Self {
            url: options.url.clone().unwrap_or_default(),
            api_key: options.api_key.clone(),
            username: options.username.clone(),
            password: options.password.clone(),
            iam_api_key: options.iam_api_key.clone(),
            iam_access_token: options.iam_access_token.clone(),
            iam_url: options.iam_url.clone(),
            learning_opt_out: options.x_watson_learning_opt_out,
            default_headers: HeaderMap::new(),
        };

        if let Ok(agent) = HeaderValue::from_str(&user_agent()) {
            config.default_headers.insert(USER_AGENT, agent);
        }
        if config.learning_opt_out {
            config.default_headers.insert(
                HeaderName::from_static(LEARNING_OPT_OUT_HEADER),
                HeaderValue::from_static("true"),
            );
        }
        config
    }

    /// Fill fields that are still unset from a discovered credentials entry.
    /// Explicitly configured values are never overwritten.
    pub fn merge_discovered(&mut self, entry: &Map<String, Value>) {
        let field = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);

        if self.url.is_empty() {
            if let Some(url) = field("url") {
                self.url = url;
            }
        }
        fill(&mut self.username, field("username"));
        fill(&mut self.password, field("password"));
        fill(&mut self.api_key, field("api_key").or_else(|| field("apikey")));
        fill(&mut self.iam_api_key, field("iam_api_key"));
        fill(&mut self.iam_access_token, field("iam_access_token"));
        fill(&mut self.iam_url, field("iam_url"));
    }

    /// Whether any bearer-token field is present
    pub fn has_token_credentials(&self) -> bool {
        self.iam_api_key.is_some() || self.iam_access_token.is_some() || self.iam_url.is_some()
    }

    /// Bearer-token fields as provider credentials
    pub fn token_credentials(&self) -> TokenCredentials {
        TokenCredentials {
            api_key: self.iam_api_key.clone(),
            access_token: self.iam_access_token.clone(),
            url: self.iam_url.clone(),
        }
    }
}

fn fill(slot: &mut Option<String>, discovered: Option<String>) {
    if slot.is_none() {
        *slot = discovered;
    }
}

/// User agent sent with every request
pub fn user_agent() -> String {
    format!(
        "cloudsvc-{} {} {}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Per-user directory for the command-line profile and log file
pub fn data_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("cloudsvc"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".cloudsvc")))
        .unwrap_or_else(|| PathBuf::from(".cloudsvc"))
}

/// Persisted command-line profile
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profile {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub iam_api_key: Option<String>,
    #[serde(default)]
    pub iam_url: Option<String>,
}

impl Profile {
    pub fn default_path() -> PathBuf {
        data_dir().join("profile.json")
    }

    /// Read a profile. A missing file is an empty profile.
    pub fn read(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read profile {}", path.display()))
            }
        };
        serde_json::from_str(&content)
            .with_context(|| format!("Profile {} is not valid JSON", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write profile {}", path.display()))
    }

    /// Overlay this profile beneath explicit options (options win)
    pub fn apply_to(&self, options: &mut ServiceOptions) {
        fill(&mut options.url, self.url.clone());
        fill(&mut options.api_key, self.api_key.clone());
        fill(&mut options.username, self.username.clone());
        fill(&mut options.password, self.password.clone());
        fill(&mut options.iam_api_key, self.iam_api_key.clone());
        fill(&mut options.iam_url, self.iam_url.clone());
    }
}

impl From<&ServiceOptions> for Profile {
    /// Keeps everything but the caller-managed access token, which expires
    fn from(options: &ServiceOptions) -> Self {
        Self {
            url: options.url.clone(),
            api_key: options.api_key.clone(),
            username: options.username.clone(),
            password: options.password.clone(),
            iam_api_key: options.iam_api_key.clone(),
            iam_url: options.iam_url.clone(),
        }
    }
}
