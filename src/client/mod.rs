//! Stateful GraphQL client.
//!
//! A [`Client`] binds a [`Server`] to a slice of the shared store
//! (`clients.<name>`) and, optionally, an [`AuthorizationController`].
//! [`Client::query`] runs one operation end to end:
//!
//! 1. parse the document and strip its `@setParameter` directives
//! 2. resolve `__STATE__` variables against the client state
//! 3. build the request envelope and apply the authorizer headers
//! 4. send it; on a 401 authorize once and start over from step 1
//! 5. write extracted values to the client state and persist them
//!
//! The client state is read from the store on every call and never cached.

pub mod error;

pub use error::{QueryError, QueryFailure};

use crate::auth::{
    AuthError, AuthState, AuthorizationController, AuthorizerRecord, AuthorizerRegistry, InFlight,
};
use crate::config::{ClientSettings, ConfigError};
use crate::executor::Server;
use crate::graphql::{
    operation_name, parse_document, process_parsed, ExtractionPlan, GraphQLRequest,
};
use crate::models::{QueryResponse, RequestEnvelope};
use crate::store::{KeyPath, StateStore};
use crate::variables::{client_state, resolve_variables};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// One operation and its caller-supplied variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    /// The operation document.
    pub query: String,

    /// Caller variables. Values may reference state as `"__STATE__<key>"`.
    pub variables: Option<Map<String, Value>>,
}

impl QueryParams {
    /// Creates params for `query` without variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
        }
    }

    /// Sets the caller variables.
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }
}

/// A named client of one GraphQL server.
pub struct Client {
    name: String,
    server: Arc<Server>,
    store: Arc<dyn StateStore>,
    authorizer: Option<Mutex<AuthorizationController>>,
    authorizing: InFlight,
}

impl Client {
    /// Creates a client without an authorizer.
    pub fn new(name: impl Into<String>, server: Arc<Server>, store: Arc<dyn StateStore>) -> Self {
        Self {
            name: name.into(),
            server,
            store,
            authorizer: None,
            authorizing: InFlight::default(),
        }
    }

    /// Attaches an authorization controller.
    pub fn with_authorizer(mut self, controller: AuthorizationController) -> Self {
        self.authorizing = controller.in_flight();
        self.authorizer = Some(Mutex::new(controller));
        self
    }

    /// Builds the client `name` from its settings.
    ///
    /// The authorizer is looked up in `registry` by its source. Bookkeeping
    /// persisted by earlier runs (tries, timestamps, last parameters) is
    /// carried over, and the merged record is written back to the store.
    ///
    /// # Arguments
    ///
    /// * `name` - Client name
    /// * `settings` - The client's settings entry
    /// * `servers` - Servers built from the settings, by name
    /// * `registry` - Available authorizer kinds
    /// * `store` - The shared state store
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the server is unknown, the authorizer
    /// source is not registered, its credentials are unusable, or the
    /// record cannot be persisted.
    pub async fn from_settings(
        name: &str,
        settings: &ClientSettings,
        servers: &BTreeMap<String, Arc<Server>>,
        registry: &AuthorizerRegistry,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, ConfigError> {
        let server = servers
            .get(&settings.server)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownServer {
                client: name.to_string(),
                server: settings.server.clone(),
            })?;

        let client = Self::new(name, server, store);
        let Some(auth) = &settings.authorizer else {
            return Ok(client);
        };

        let authorizer = registry
            .create(&auth.source, &auth.credentials)
            .map_err(|e| match e {
                AuthError::UnknownSource(kind) => ConfigError::UnknownAuthorizerSource {
                    client: name.to_string(),
                    kind,
                },
                other => ConfigError::InvalidCredentials {
                    client: name.to_string(),
                    reason: other.to_string(),
                },
            })?;

        let mut record = AuthorizerRecord::new(&auth.source, auth.credentials.clone());
        if let Some(max_calls) = auth.max_calls {
            record.max_calls = max_calls;
        }
        let persisted = client
            .store
            .get(&KeyPath::client_authorizer(name))
            .await
            .and_then(|value| serde_json::from_value::<AuthorizerRecord>(value).ok());
        if let Some(persisted) = persisted {
            record = record.with_bookkeeping_from(&persisted);
        }

        let controller = AuthorizationController::new(name, authorizer, record);
        controller.persist(client.store.as_ref()).await?;
        debug!(client = %name, source = %auth.source, "authorizer bound");

        Ok(client.with_authorizer(controller))
    }

    /// Client name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The server this client talks to.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Whether an authorizer is bound.
    pub fn has_authorizer(&self) -> bool {
        self.authorizer.is_some()
    }

    /// Current authorization state, or `None` without an authorizer.
    ///
    /// While an attempt is awaiting the authorizer this is
    /// `Authenticating`, without waiting for the controller.
    pub async fn auth_state(&self) -> Option<AuthState> {
        let controller = self.authorizer.as_ref()?;
        if self.authorizing.is_set() {
            return Some(AuthState::Authenticating);
        }
        Some(controller.lock().await.state())
    }

    /// A copy of the authorizer record, or `None` without an authorizer.
    pub async fn authorizer_info(&self) -> Option<AuthorizerRecord> {
        match &self.authorizer {
            Some(controller) => Some(controller.lock().await.record().clone()),
            None => None,
        }
    }

    /// The client state as currently held by the store.
    pub async fn state(&self) -> Map<String, Value> {
        client_state(self.store.as_ref(), &self.name).await
    }

    /// Makes one authorization attempt outside of a query.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotConfigured` without an authorizer, otherwise
    /// the attempt's error.
    pub async fn authorize(&self) -> Result<(), AuthError> {
        let controller = self.authorizer.as_ref().ok_or(AuthError::NotConfigured)?;
        controller.lock().await.authorize(self.store.as_ref()).await
    }

    /// Clears the authorizer's failure counter so a 401 may trigger
    /// re-authorization again.
    pub async fn reset_authorizer_tries(&self) -> Result<(), AuthError> {
        let controller = self.authorizer.as_ref().ok_or(AuthError::NotConfigured)?;
        controller.lock().await.reset_tries(self.store.as_ref()).await
    }

    /// Executes a GraphQL operation.
    ///
    /// On a 401 from the server, and only when an authorizer is bound and
    /// its `tries` are below `maxCalls`, one authorization attempt is made.
    /// If it succeeds the whole pipeline runs once more with the original
    /// params, so the new headers and any changed state are picked up.
    ///
    /// # Arguments
    ///
    /// * `params` - The operation document and caller variables
    ///
    /// # Returns
    ///
    /// The server's response with the request envelope that produced it.
    ///
    /// # Errors
    ///
    /// Returns a `QueryFailure` carrying the envelope when one was built.
    /// A 401 that could not be recovered from is flagged with
    /// `authorization_exhausted`.
    pub async fn query(&self, params: &QueryParams) -> Result<QueryResponse, QueryFailure> {
        let mut reauthorized = false;

        loop {
            let (envelope, plan) = self.prepare(params).await?;

            let err = match self.server.send(&envelope).await {
                Ok(reply) => return self.finish(reply.into_response(envelope), &plan).await,
                Err(err) => err,
            };

            let mut exhausted = false;
            if err.is_unauthorized() {
                if let Some(controller) = &self.authorizer {
                    let mut controller = controller.lock().await;
                    if !reauthorized && controller.can_retry() {
                        reauthorized = true;
                        match controller.authorize(self.store.as_ref()).await {
                            Ok(()) => continue,
                            Err(auth @ AuthError::Persist(_)) => {
                                return Err(QueryFailure::new(auth.into()).with_request(envelope));
                            }
                            Err(_) => {}
                        }
                    }
                    exhausted = true;
                }
            }

            warn!(
                client = %self.name,
                status = ?err.status_code(),
                error = %err,
                "query response error"
            );
            let failure = QueryFailure::new(err.into()).with_request(envelope);
            return Err(if exhausted {
                failure.authorization_exhausted()
            } else {
                failure
            });
        }
    }

    async fn prepare(
        &self,
        params: &QueryParams,
    ) -> Result<(RequestEnvelope, ExtractionPlan), QueryFailure> {
        let document = parse_document(&params.query)?;
        let operation = operation_name(&document)?;

        let payload = resolve_variables(
            &document,
            params.variables.as_ref(),
            &self.name,
            self.store.as_ref(),
        )
        .await;
        if payload.is_missing() {
            warn!(
                client = %self.name,
                operation = ?operation,
                "operation declares variables but none were supplied"
            );
        }

        let processed = process_parsed(document)?;
        let body = GraphQLRequest::new(processed.document)
            .with_operation_name(operation)
            .with_variables(payload.to_value());

        let mut envelope = RequestEnvelope::new(body);
        if let Some(controller) = &self.authorizer {
            envelope = controller.lock().await.enhance(envelope);
        }
        Ok((envelope, processed.plan))
    }

    /// Writes the values extracted from `response` to the client state.
    ///
    /// Each key is written separately so concurrent calls touching disjoint
    /// keys do not overwrite each other.
    async fn finish(
        &self,
        response: QueryResponse,
        plan: &ExtractionPlan,
    ) -> Result<QueryResponse, QueryFailure> {
        if plan.is_empty() {
            return Ok(response);
        }
        let Some(data) = response.data().filter(|data| data.is_object()) else {
            return Ok(response);
        };

        let extracted = plan.apply(data);
        let state_path = KeyPath::client_state(&self.name);
        for (key, value) in extracted {
            self.store.set(&state_path.child(key), value).await;
        }

        if let Err(e) = self.store.save().await {
            error!(client = %self.name, error = %e, "cache write failed");
            return Err(QueryFailure::new(QueryError::Persist(e)).with_request(response.req));
        }
        debug!(client = %self.name, keys = plan.len(), "state updated");
        Ok(response)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("server", &self.server.name())
            .field("authorizer", &self.authorizer.is_some())
            .finish()
    }
}
