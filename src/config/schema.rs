//! Settings schema for qi.
//!
//! This module defines the structure of `.qi/settings.json` and its
//! validation logic.
//!
//! ```json
//! {
//!   "servers": {
//!     "dev": { "url": "https://api.example.com/graphql", "timeout": 5000 }
//!   },
//!   "clients": {
//!     "tester": {
//!       "server": "dev",
//!       "default": true,
//!       "authorizer": {
//!         "source": "qi-cognito",
//!         "credentials": { "username": "tester", "password": "...", "userPoolId": "...", "clientId": "..." }
//!       }
//!     }
//!   },
//!   "queries": "queries/**/*.graphql",
//!   "vars": "queries/**/*.vars.json"
//! }
//! ```

use super::ConfigError;
use crate::models::Headers;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Servers by name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerSettings>,

    /// Clients by name.
    #[serde(default)]
    pub clients: BTreeMap<String, ClientSettings>,

    /// Glob matching operation documents, relative to the project root.
    #[serde(default = "default_queries_glob")]
    pub queries: String,

    /// Glob matching variable files, relative to the project root.
    #[serde(default = "default_vars_glob")]
    pub vars: String,
}

/// Transport settings of one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// GraphQL endpoint.
    #[serde(default)]
    pub url: String,

    /// Headers sent with every request.
    #[serde(default)]
    pub headers: Headers,

    /// Request timeout in milliseconds. Defaults to 10000.
    ///
    /// Must be greater than 0.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// A named client: a server plus an optional authorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    /// Name of the server in [`Settings::servers`].
    pub server: String,

    /// Authorizer binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizer: Option<AuthorizerSettings>,

    /// Whether this is the default client.
    #[serde(default)]
    pub default: bool,
}

/// Authorizer binding of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerSettings {
    /// Authorizer kind, e.g. `qi-bearer`.
    #[serde(default)]
    pub source: String,

    /// Kind-specific credentials.
    #[serde(default)]
    pub credentials: Value,

    /// Retry budget; see `AuthorizerRecord::max_calls`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_calls: Option<u32>,
}

impl ServerSettings {
    /// Creates settings for `url` with default headers and timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Headers::new(),
            timeout: default_timeout(),
        }
    }

    /// Returns the timeout as a `std::time::Duration`.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

impl ClientSettings {
    /// Creates settings for a client of `server` without an authorizer.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            authorizer: None,
            default: false,
        }
    }
}

impl Settings {
    /// Validates the settings.
    ///
    /// # Returns
    ///
    /// `Ok(())` if all settings are valid, or the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        if self.clients.is_empty() {
            return Err(ConfigError::NoClients);
        }

        for (name, server) in &self.servers {
            validate_url(name, &server.url)?;
            if server.timeout == 0 {
                return Err(ConfigError::InvalidTimeout {
                    server: name.clone(),
                });
            }
        }

        for (name, client) in &self.clients {
            if !self.servers.contains_key(&client.server) {
                return Err(ConfigError::UnknownServer {
                    client: name.clone(),
                    server: client.server.clone(),
                });
            }
            if let Some(authorizer) = &client.authorizer {
                if authorizer.source.trim().is_empty() {
                    return Err(ConfigError::MissingAuthorizerSource {
                        client: name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Name of the client flagged as default, if any.
    pub fn default_client(&self) -> Option<&str> {
        self.clients
            .iter()
            .find(|(_, client)| client.default)
            .map(|(name, _)| name.as_str())
    }
}

/// Validates a server URL.
///
/// # Arguments
///
/// * `server` - Server name, for error messages
/// * `url` - The URL to validate
///
/// # Returns
///
/// The parsed URL, or `ConfigError` if it is missing, malformed, or not
/// HTTP(S).
pub fn validate_url(server: &str, url: &str) -> Result<Url, ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::MissingUrl {
            server: server.to_string(),
        });
    }

    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        server: server.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ConfigError::InvalidUrl {
            server: server.to_string(),
            reason: format!("Only HTTP and HTTPS are supported, got: {}", scheme),
        });
    }

    Ok(parsed)
}

// Default value functions for serde

fn default_timeout() -> u64 {
    10000
}

fn default_queries_glob() -> String {
    "queries/**/*.graphql".to_string()
}

fn default_vars_glob() -> String {
    "queries/**/*.vars.json".to_string()
}
