//! Client authorization.
//!
//! An [`Authorizer`] obtains header parameters (for example an
//! `Authorization` header) and merges them into outgoing requests. Authorizers
//! are created by kind from an [`AuthorizerRegistry`] when a client is built;
//! the built-in kinds are:
//!
//! - `qi-bearer`: `{ "token": "..." }` → `Authorization: Bearer <token>`
//! - `qi-basic`: `{ "username": "...", "password": "..." }` → `Authorization: Basic ...`
//! - `qi-cognito`: `{ "username", "password", "userPoolId", "clientId" }` →
//!   `Authorization: <IdToken>`
//!
//! The bookkeeping around an authorizer (tries, timestamps, last parameters)
//! lives in [`controller::AuthorizationController`].

pub mod basic;
pub mod bearer;
pub mod cognito;
pub mod controller;

pub use controller::{AuthState, AuthStatus, AuthorizationController, AuthorizerRecord, InFlight};

use crate::models::{Headers, RequestEnvelope};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Header parameters produced by a successful authorization.
pub type HeaderParameters = Headers;

/// Prefix of the built-in authorizer kinds.
pub const BUILTIN_PREFIX: &str = "qi-";

/// Errors that can occur during authorization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The authorizer ran and was refused.
    #[error("Authorization failed: {0}")]
    Failed(String),

    /// A required credential field is missing or empty.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// `authorize` was called on a client without an authorizer.
    #[error("Calling authorize on client without authorizer")]
    NotConfigured,

    /// No authorizer is registered for the requested kind.
    #[error("Unknown authorizer source: {0}")]
    UnknownSource(String),

    /// The authorizer record could not be persisted.
    #[error("Failed to persist authorizer state: {0}")]
    Persist(String),
}

/// Obtains authorization parameters and applies them to requests.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Performs one authorization attempt.
    ///
    /// # Returns
    ///
    /// Header parameters to attach to subsequent requests, or the reason the
    /// attempt failed.
    async fn authorize(&self) -> Result<HeaderParameters, AuthError>;

    /// Merges `parameters` into the request's headers.
    ///
    /// This is a pure transformation. Without parameters the envelope is
    /// returned unchanged.
    fn request_enhance(
        &self,
        mut envelope: RequestEnvelope,
        parameters: Option<&HeaderParameters>,
    ) -> RequestEnvelope {
        if let Some(parameters) = parameters {
            envelope.merge_headers(parameters);
        }
        envelope
    }
}

/// Builds an authorizer from its credentials.
pub type AuthorizerFactory =
    Arc<dyn Fn(&Value) -> Result<Box<dyn Authorizer>, AuthError> + Send + Sync>;

/// Maps authorizer kinds to their constructors.
#[derive(Clone)]
pub struct AuthorizerRegistry {
    factories: HashMap<String, AuthorizerFactory>,
}

impl AuthorizerRegistry {
    /// Creates a registry with no kinds registered.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in kinds.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(bearer::KIND, |credentials| {
            Ok(Box::new(bearer::BearerAuthorizer::from_credentials(credentials)?))
        });
        registry.register(basic::KIND, |credentials| {
            Ok(Box::new(basic::BasicAuthorizer::from_credentials(credentials)?))
        });
        registry.register(cognito::KIND, |credentials| {
            Ok(Box::new(cognito::CognitoAuthorizer::from_credentials(credentials)?))
        });
        registry
    }

    /// Registers `factory` under `kind`, replacing any previous registration.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Box<dyn Authorizer>, AuthError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Returns true if `kind` is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Builds the authorizer registered under `source`.
    ///
    /// # Arguments
    ///
    /// * `source` - The authorizer kind from the client settings
    /// * `credentials` - The kind-specific credentials object
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownSource` if nothing is registered for
    /// `source`, or the factory's error if the credentials are unusable.
    pub fn create(&self, source: &str, credentials: &Value) -> Result<Box<dyn Authorizer>, AuthError> {
        let factory = self
            .factories
            .get(source)
            .ok_or_else(|| AuthError::UnknownSource(source.to_string()))?;
        factory(credentials)
    }
}

impl Default for AuthorizerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for AuthorizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Reads a required, non-empty string field from an authorizer's credentials.
///
/// # Errors
///
/// Returns `AuthError::MissingCredentials` naming the authorizer kind and the
/// field.
pub fn required_credential<'a>(
    credentials: &'a Value,
    kind: &str,
    field: &str,
) -> Result<&'a str, AuthError> {
    credentials
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AuthError::MissingCredentials(format!("{}: missing {}", kind, field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::GraphQLRequest;
    use serde_json::json;

    struct Fixed;

    #[async_trait]
    impl Authorizer for Fixed {
        async fn authorize(&self) -> Result<HeaderParameters, AuthError> {
            Ok(HeaderParameters::from([("X-Key".to_string(), "k".to_string())]))
        }
    }

    #[test]
    fn test_builtin_kinds() {
        let registry = AuthorizerRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["qi-basic", "qi-bearer", "qi-cognito"]);
        assert!(registry.kinds().iter().all(|k| k.starts_with(BUILTIN_PREFIX)));
    }

    #[test]
    fn test_create_unknown_source() {
        let registry = AuthorizerRegistry::with_builtins();
        let result = registry.create("./my-authorizer", &json!({}));
        assert_eq!(
            result.err(),
            Some(AuthError::UnknownSource("./my-authorizer".to_string()))
        );
    }

    #[test]
    fn test_create_reports_missing_credentials() {
        let registry = AuthorizerRegistry::with_builtins();
        let result = registry.create("qi-bearer", &json!({}));
        assert!(matches!(result, Err(AuthError::MissingCredentials(_))));
    }

    #[tokio::test]
    async fn test_register_custom_kind() {
        let mut registry = AuthorizerRegistry::empty();
        registry.register("apikey", |_| Ok(Box::new(Fixed)));

        let authorizer = registry.create("apikey", &Value::Null).unwrap();
        let parameters = authorizer.authorize().await.unwrap();
        assert_eq!(parameters.get("X-Key").map(String::as_str), Some("k"));
    }

    #[test]
    fn test_default_request_enhance() {
        let envelope = RequestEnvelope::new(GraphQLRequest::new("{ a }".to_string()));

        let unchanged = Fixed.request_enhance(envelope.clone(), None);
        assert_eq!(unchanged, envelope);

        let parameters = HeaderParameters::from([("Authorization".to_string(), "t".to_string())]);
        let enhanced = Fixed.request_enhance(envelope, Some(&parameters));
        assert_eq!(enhanced.header("authorization"), Some("t"));
    }

    #[test]
    fn test_required_credential() {
        let credentials = json!({"token": "abc", "empty": "", "number": 3});
        assert_eq!(required_credential(&credentials, "qi-bearer", "token"), Ok("abc"));
        assert_eq!(
            required_credential(&credentials, "qi-bearer", "empty"),
            Err(AuthError::MissingCredentials("qi-bearer: missing empty".to_string()))
        );
        assert!(required_credential(&credentials, "qi-bearer", "number").is_err());
    }
}
