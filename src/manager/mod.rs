//! Project session.
//!
//! A [`Session`] wires a project directory together: the cache store
//! `.qi/cache.json`, the settings `.qi/settings.json`, the query and
//! variables catalogs, and a [`Client`] per configured client. The client
//! flagged `default` is also reachable under the name `default`.

pub mod catalog;
pub mod selection;

pub use catalog::{read_glob, Catalog, CatalogEntry, VARS_SUFFIX};
pub use selection::{
    Choices, Diagnostics, QueryPlan, QuerySelection, SelectedParams, SelectedQuery, VarsSelection,
};

use crate::auth::AuthorizerRegistry;
use crate::client::{Client, QueryError, QueryFailure, QueryParams};
use crate::config::{cache_path, load_settings, settings_path, ConfigError, Settings};
use crate::executor::Server;
use crate::graphql::introspection::INTROSPECTION_QUERY;
use crate::graphql::parse_document;
use crate::models::QueryResponse;
use crate::store::{JsonFileStore, KeyPath, StateStore, StoreError, StoreOptions};
use crate::variables::used_outside_variables;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Alias under which the default client is registered.
pub const DEFAULT_CLIENT: &str = "default";

/// Errors raised while setting up or using a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Settings or client wiring are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The cache could not be read or written.
    #[error("Problem with reading/writing cache: {0}")]
    Store(#[from] StoreError),

    /// A catalog glob is malformed.
    #[error("Invalid glob \"{pattern}\": {reason}")]
    Pattern {
        /// The glob from the settings.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A query or variables file could not be read.
    #[error("Error reading file \"{path}\": {source}")]
    ReadFile {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A variables file is not valid JSON.
    #[error("Error parsing variables file \"{path}\": {source}")]
    VarsFile {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// A loaded project.
#[derive(Debug)]
pub struct Session {
    root: PathBuf,
    settings: Settings,
    cache: Arc<JsonFileStore>,
    queries: Catalog,
    vars: Catalog,
    clients: BTreeMap<String, Arc<Client>>,
}

impl Session {
    /// Loads the project at `root` with the built-in authorizer kinds.
    ///
    /// # Errors
    ///
    /// See [`Session::init_with_registry`].
    pub async fn init(root: impl AsRef<Path>) -> Result<Self, SessionError> {
        Self::init_with_registry(root, &AuthorizerRegistry::default()).await
    }

    /// Loads the project at `root`.
    ///
    /// The cache is created when missing. The query and variables catalogs
    /// are refreshed from the settings globs and written to the cache before
    /// any client is built.
    ///
    /// # Arguments
    ///
    /// * `root` - Project directory holding `.qi/`
    /// * `registry` - Authorizer kinds available to clients
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the cache or settings cannot be loaded,
    /// a glob is malformed, or a server or client cannot be built.
    pub async fn init_with_registry(
        root: impl AsRef<Path>,
        registry: &AuthorizerRegistry,
    ) -> Result<Self, SessionError> {
        let root = root.as_ref().to_path_buf();

        let cache = Arc::new(
            JsonFileStore::open(
                StoreOptions::new(cache_path(&root), "cache").create_if_missing(true),
            )
            .await
            .map_err(|e| {
                error!(error = %e, "Problem with reading/writing cache");
                e
            })?,
        );
        let settings = load_settings(settings_path(&root)).await?;

        let queries = read_glob(&root, &settings.queries, None)?;
        let vars = read_glob(&root, &settings.vars, Some(VARS_SUFFIX))?;
        let catalogs = [("queries", &queries), ("vars", &vars)];
        for (key, catalog) in catalogs {
            let value = serde_json::to_value(catalog).map_err(StoreError::from)?;
            cache.set(&KeyPath::parse(key), value).await;
        }
        cache.save().await?;
        debug!(
            queries = queries.files.len(),
            vars = vars.files.len(),
            "catalogs refreshed"
        );

        let mut servers = BTreeMap::new();
        for (name, server) in &settings.servers {
            servers.insert(name.clone(), Arc::new(Server::new(name, server)?));
        }

        let store: Arc<dyn StateStore> = cache.clone();
        let mut clients = BTreeMap::new();
        for (name, client_settings) in &settings.clients {
            let client = Arc::new(
                Client::from_settings(name, client_settings, &servers, registry, store.clone())
                    .await?,
            );
            clients.insert(name.clone(), client.clone());
            if client_settings.default {
                clients.insert(DEFAULT_CLIENT.to_string(), client);
            }
        }

        info!(
            root = %root.display(),
            clients = settings.clients.len(),
            "session initialized"
        );
        Ok(Self {
            root,
            settings,
            cache,
            queries,
            vars,
            clients,
        })
    }

    /// Project directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loaded settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The cache store shared by all clients.
    pub fn cache(&self) -> &Arc<JsonFileStore> {
        &self.cache
    }

    /// Operation documents by name.
    pub fn queries(&self) -> &Catalog {
        &self.queries
    }

    /// Variables files by query name.
    pub fn vars(&self) -> &Catalog {
        &self.vars
    }

    /// Clients by name, including the `default` alias.
    pub fn clients(&self) -> &BTreeMap<String, Arc<Client>> {
        &self.clients
    }

    /// Looks up a client by name or alias.
    pub fn client(&self, name: &str) -> Option<&Arc<Client>> {
        self.clients.get(name)
    }

    /// Resolves what `selection` refers to.
    ///
    /// The client is the named one, else the only configured one, else the
    /// default one. The variables are only required when the operation
    /// declares variables that do not come from state.
    ///
    /// # Returns
    ///
    /// A plan that is either ready to run, lists choices to make, or
    /// carries errors.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the query or variables file cannot be
    /// read or the variables file is not JSON.
    pub async fn query_params(&self, selection: &QuerySelection) -> Result<QueryPlan, SessionError> {
        let mut plan = QueryPlan::default();

        let client = selection
            .client
            .clone()
            .or_else(|| self.only_client())
            .or_else(|| self.settings.default_client().map(str::to_string));
        let Some(client) = client else {
            plan.select.client = Some(self.clients.keys().cloned().collect());
            return Ok(plan);
        };
        if !self.clients.contains_key(&client) {
            plan.errors.client = Some(format!("Client: \"{}\" does not exist", client));
            return Ok(plan);
        }
        plan.params.client = Some(client);

        let Some(query) = selection.query.clone() else {
            plan.select.query = Some(self.queries.names());
            return Ok(plan);
        };
        let Some(entry) = self.queries.get(&query) else {
            plan.errors.query = Some(format!("Query: \"{}\" does not exist", query));
            return Ok(plan);
        };
        let content = self.read_file(&entry.file).await?;
        let needs_vars = match parse_document(&content) {
            Ok(document) => !used_outside_variables(&document).is_empty(),
            Err(_) => false,
        };
        plan.params.query = Some(SelectedQuery {
            name: query.clone(),
            content,
        });

        if !needs_vars {
            if selection.vars.is_some() {
                plan.warnings.vars = Some("Variables specified but not needed".to_string());
            }
            plan.params.vars = Some(VarsSelection::NotNeeded);
            return Ok(plan);
        }

        let Some(entry) = self.vars.get(&query) else {
            plan.errors.vars = Some(format!(
                "Variables file with name: \"{}\" does not exist",
                query
            ));
            return Ok(plan);
        };
        let sets = self.read_vars(&entry.file).await?;

        let name = match &selection.vars {
            Some(name) => {
                if sets.get(name).map_or(true, Value::is_null) {
                    plan.errors.vars = Some(format!(
                        "Variables with name: \"{}\" in the basefilename \"{}\" does not exist",
                        name, query
                    ));
                    plan.select.vars = Some(sets.keys().cloned().collect());
                    return Ok(plan);
                }
                name.clone()
            }
            None if sets.len() == 1 => {
                let only = sets.keys().next().cloned().unwrap_or_default();
                plan.warnings.vars = Some(format!(
                    "Variables not specified, using the only one \"{}\" in basefilename \"{}\"",
                    only, query
                ));
                only
            }
            None => {
                plan.select.vars = Some(sets.keys().cloned().collect());
                return Ok(plan);
            }
        };

        match sets.get(&name) {
            Some(Value::Object(data)) => {
                plan.params.vars = Some(VarsSelection::Named {
                    name,
                    data: data.clone(),
                });
            }
            _ => {
                plan.errors.vars = Some(format!(
                    "Variables with name: \"{}\" in the basefilename \"{}\" is not an object",
                    name, query
                ));
            }
        }
        Ok(plan)
    }

    /// Runs `params` with the client registered as `client`.
    ///
    /// # Errors
    ///
    /// Returns a `QueryFailure` with `ConfigError::UnknownClient` for an
    /// unknown name, otherwise whatever [`Client::query`] returns.
    pub async fn query(
        &self,
        client: &str,
        params: &QueryParams,
    ) -> Result<QueryResponse, QueryFailure> {
        let client = self.client(client).ok_or_else(|| {
            QueryFailure::new(QueryError::Config(ConfigError::UnknownClient(
                client.to_string(),
            )))
        })?;
        client.query(params).await
    }

    /// Fetches the schema through `client` and caches it under `schema`.
    ///
    /// The cached entry is `{content, status, ts}`, where `content` is the
    /// introspection `data`, `status` is `"ok"` or the GraphQL error list,
    /// and `ts` is an RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Returns the query's failure, or `QueryError::Persist` if the cache
    /// cannot be written.
    pub async fn get_schema(&self, client: &str) -> Result<QueryResponse, QueryFailure> {
        let response = self.query(client, &QueryParams::new(INTROSPECTION_QUERY)).await?;

        let status = match response.errors() {
            Some(errors) => Value::Array(errors.clone()),
            None => json!("ok"),
        };
        let schema = json!({
            "content": response.body.get("data").cloned().unwrap_or(Value::Null),
            "status": status,
            "ts": Utc::now().to_rfc3339(),
        });

        if let Err(e) = self.cache.set_save(&KeyPath::parse("schema"), schema).await {
            error!(error = %e, "Write cache failed");
            return Err(QueryFailure::new(QueryError::Persist(e)).with_request(response.req));
        }
        Ok(response)
    }

    fn only_client(&self) -> Option<String> {
        if self.settings.clients.len() == 1 {
            self.settings.clients.keys().next().cloned()
        } else {
            None
        }
    }

    async fn read_file(&self, file: &str) -> Result<String, SessionError> {
        let path = self.root.join(file);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| SessionError::ReadFile { path, source })
    }

    async fn read_vars(&self, file: &str) -> Result<Map<String, Value>, SessionError> {
        let content = self.read_file(file).await?;
        serde_json::from_str(&content).map_err(|source| SessionError::VarsFile {
            path: self.root.join(file),
            source,
        })
    }
}
