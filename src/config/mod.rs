//! Configuration management for qi.
//!
//! Settings are read from `.qi/settings.json` in the project root, validated,
//! and then used to build servers and clients.

pub mod schema;

pub use schema::{validate_url, AuthorizerSettings, ClientSettings, ServerSettings, Settings};

use crate::store::StoreError;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Directory holding qi's files, relative to the project root.
pub const QI_DIR: &str = ".qi";

/// Settings file name inside [`QI_DIR`].
pub const SETTINGS_FILE: &str = "settings.json";

/// Cache file name inside [`QI_DIR`].
pub const CACHE_FILE: &str = "cache.json";

/// Errors in the settings or the wiring derived from them.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No servers are configured.
    #[error("No servers in the settings.")]
    NoServers,

    /// No clients are configured.
    #[error("No clients in the settings.")]
    NoClients,

    /// A client references a server that is not configured.
    #[error("Client \"{client}\" specifies non existing server \"{server}\"")]
    UnknownServer {
        /// Client name.
        client: String,
        /// Referenced server.
        server: String,
    },

    /// A client name is not configured.
    #[error("Client: \"{0}\" does not exist")]
    UnknownClient(String),

    /// A server has no URL.
    #[error("Missing url for server \"{server}\"")]
    MissingUrl {
        /// Server name.
        server: String,
    },

    /// A server URL cannot be used.
    #[error("Invalid url for server \"{server}\": {reason}")]
    InvalidUrl {
        /// Server name.
        server: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A server timeout is zero.
    #[error("Timeout of server \"{server}\" must be greater than 0")]
    InvalidTimeout {
        /// Server name.
        server: String,
    },

    /// A default header cannot be sent.
    #[error("Invalid header \"{header}\" for server \"{server}\"")]
    InvalidHeader {
        /// Server name.
        server: String,
        /// Header name.
        header: String,
    },

    /// A client has an authorizer without a source.
    #[error("Client \"{client}\" has an authorizer without source")]
    MissingAuthorizerSource {
        /// Client name.
        client: String,
    },

    /// No authorizer is registered for a client's source.
    #[error("Client \"{client}\" uses unknown authorizer source \"{kind}\"")]
    UnknownAuthorizerSource {
        /// Client name.
        client: String,
        /// The configured source.
        kind: String,
    },

    /// An authorizer rejected the credentials it was given.
    #[error("Invalid credentials for client \"{client}\": {reason}")]
    InvalidCredentials {
        /// Client name.
        client: String,
        /// What is wrong with them.
        reason: String,
    },

    /// The HTTP client could not be created.
    #[error("Failed to create HTTP client for server \"{server}\": {reason}")]
    HttpClient {
        /// Server name.
        server: String,
        /// Underlying error.
        reason: String,
    },

    /// The settings file could not be read.
    #[error("Problem with reading settings {path}: {source}")]
    Read {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid.
    #[error("Problem with parsing settings {path}: {source}")]
    Parse {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The cache could not be opened or written.
    #[error("Problem with reading/writing cache: {0}")]
    Store(#[from] StoreError),
}

/// Path of the settings file under `root`.
pub fn settings_path(root: &Path) -> PathBuf {
    root.join(QI_DIR).join(SETTINGS_FILE)
}

/// Path of the cache file under `root`.
pub fn cache_path(root: &Path) -> PathBuf {
    root.join(QI_DIR).join(CACHE_FILE)
}

/// Loads and validates settings from `path`.
///
/// # Arguments
///
/// * `path` - The settings JSON file
///
/// # Returns
///
/// `Ok(Settings)` with the loaded settings, or `Err` if the file cannot be
/// read, is not valid JSON, or fails validation.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> Result<(), qi_client::config::ConfigError> {
/// use qi_client::config::load_settings;
///
/// let settings = load_settings(".qi/settings.json").await?;
/// println!("{} clients", settings.clients.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_settings(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let settings = parse_settings(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    settings.validate()?;

    debug!(
        path = %path.display(),
        servers = settings.servers.len(),
        clients = settings.clients.len(),
        "settings loaded"
    );
    Ok(settings)
}

/// Parses settings from JSON text without validating them.
pub fn parse_settings(content: &str) -> Result<Settings, serde_json::Error> {
    serde_json::from_str(content)
}
