//! Per-client authorization bookkeeping.
//!
//! The [`AuthorizationController`] owns a client's authorizer and its
//! [`AuthorizerRecord`]. Each [`AuthorizationController::authorize`] call is a
//! single attempt; retry gating (`tries < maxCalls`) is left to the caller.
//!
//! ```text
//! Unauthenticated ──authorize()──▶ Authenticating ──▶ Authenticated
//!                                        │
//!                                        └──────────▶ Failed ──authorize()──▶ Authenticating
//! ```
//!
//! Every transition is persisted to `clients.<name>.authorizer` before
//! `authorize` returns. `Authenticating` is never persisted: it is read from
//! an [`InFlight`] flag shared with the owning client, raised only while the
//! authorizer is being awaited.

use super::{AuthError, Authorizer, HeaderParameters};
use crate::models::RequestEnvelope;
use crate::store::{KeyPath, StateStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Default for [`AuthorizerRecord::max_calls`].
pub const DEFAULT_MAX_CALLS: u32 = 1;

fn default_max_calls() -> u32 {
    DEFAULT_MAX_CALLS
}

/// Outcome of the last authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    /// The last attempt succeeded.
    Ok,
    /// The last attempt failed.
    Failed {
        /// Why it failed.
        message: String,
    },
}

/// Authorization state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No attempt has been made yet.
    Unauthenticated,
    /// An attempt is in progress.
    Authenticating,
    /// The last attempt succeeded.
    Authenticated,
    /// The last attempt failed.
    Failed,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticating => "authenticating",
            AuthState::Authenticated => "authenticated",
            AuthState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Persisted authorizer bookkeeping of one client.
///
/// Credentials are read from the settings and never written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerRecord {
    /// Authorizer kind, e.g. `qi-cognito`.
    pub source: String,

    /// Kind-specific credentials.
    #[serde(default, skip_serializing)]
    pub credentials: Value,

    /// Consecutive failed attempts. Reset to 0 by any success.
    #[serde(default)]
    pub tries: u32,

    /// Total attempts.
    #[serde(default)]
    pub called: u32,

    /// Retry budget: an automatic re-authorization is allowed while
    /// `tries < max_calls`.
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,

    /// Outcome of the last attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AuthStatus>,

    /// Header parameters from the last successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<HeaderParameters>,

    /// Time of the last attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_called: Option<DateTime<Utc>>,

    /// Time of the last successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,

    /// Time of the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<DateTime<Utc>>,
}

impl AuthorizerRecord {
    /// Creates a fresh record.
    pub fn new(source: impl Into<String>, credentials: Value) -> Self {
        Self {
            source: source.into(),
            credentials,
            tries: 0,
            called: 0,
            max_calls: DEFAULT_MAX_CALLS,
            status: None,
            parameters: None,
            last_called: None,
            last_success: None,
            last_error: None,
        }
    }

    /// Copies counters, status, parameters and timestamps from a persisted
    /// record, keeping this record's source, credentials and budget.
    pub fn with_bookkeeping_from(mut self, persisted: &AuthorizerRecord) -> Self {
        self.tries = persisted.tries;
        self.called = persisted.called;
        self.status = persisted.status.clone();
        self.parameters = persisted.parameters.clone();
        self.last_called = persisted.last_called;
        self.last_success = persisted.last_success;
        self.last_error = persisted.last_error;
        self
    }

    /// Applies a successful attempt made at `at`.
    pub fn record_success(&mut self, parameters: HeaderParameters, at: DateTime<Utc>) {
        self.called += 1;
        self.last_called = Some(at);
        self.tries = 0;
        self.status = Some(AuthStatus::Ok);
        self.last_success = Some(at);
        self.parameters = Some(parameters);
    }

    /// Applies a failed attempt made at `at`.
    pub fn record_failure(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.called += 1;
        self.last_called = Some(at);
        self.tries += 1;
        self.status = Some(AuthStatus::Failed {
            message: message.into(),
        });
        self.last_error = Some(at);
        self.parameters = None;
    }

    /// Whether another automatic authorization attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.tries < self.max_calls
    }

    /// State implied by the last outcome.
    pub fn state(&self) -> AuthState {
        match self.status {
            None => AuthState::Unauthenticated,
            Some(AuthStatus::Ok) => AuthState::Authenticated,
            Some(AuthStatus::Failed { .. }) => AuthState::Failed,
        }
    }
}

/// Shared flag set while an authorization attempt awaits its authorizer.
///
/// Clones observe the same flag, so it can be read without holding the
/// controller.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    /// Whether an attempt is currently awaiting the authorizer.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn raise(&self) -> InFlightGuard<'_> {
        self.0.store(true, Ordering::Release);
        InFlightGuard(&self.0)
    }
}

/// Lowers the flag when dropped, including when the attempt is cancelled.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns a client's authorizer and its record.
pub struct AuthorizationController {
    client: String,
    authorizer: Box<dyn Authorizer>,
    record: AuthorizerRecord,
    in_flight: InFlight,
}

impl AuthorizationController {
    /// Creates a controller for `client`.
    pub fn new(
        client: impl Into<String>,
        authorizer: Box<dyn Authorizer>,
        record: AuthorizerRecord,
    ) -> Self {
        Self {
            client: client.into(),
            authorizer,
            record,
            in_flight: InFlight::default(),
        }
    }

    /// Name of the owning client.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// The current record.
    pub fn record(&self) -> &AuthorizerRecord {
        &self.record
    }

    /// A handle on the in-flight flag of this controller.
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Current authorization state.
    pub fn state(&self) -> AuthState {
        if self.in_flight.is_set() {
            AuthState::Authenticating
        } else {
            self.record.state()
        }
    }

    /// Whether another automatic authorization attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.record.can_retry()
    }

    /// Applies the stored parameters to `envelope`.
    pub fn enhance(&self, envelope: RequestEnvelope) -> RequestEnvelope {
        self.authorizer
            .request_enhance(envelope, self.record.parameters.as_ref())
    }

    /// Makes one authorization attempt and persists the outcome.
    ///
    /// # Arguments
    ///
    /// * `store` - Store receiving the updated record
    ///
    /// # Errors
    ///
    /// Returns the authorizer's error when the attempt fails, or
    /// `AuthError::Persist` when the record cannot be saved. The in-memory
    /// record reflects the attempt in both cases.
    pub async fn authorize(&mut self, store: &dyn StateStore) -> Result<(), AuthError> {
        info!(client = %self.client, source = %self.record.source, "calling authorize");

        let outcome = {
            let _raised = self.in_flight.raise();
            self.authorizer.authorize().await
        };

        let now = Utc::now();
        let result = match outcome {
            Ok(parameters) => {
                self.record.record_success(parameters, now);
                info!(client = %self.client, "authorize success");
                Ok(())
            }
            Err(err) => {
                error!(client = %self.client, error = %err, "Authorize unsuccessful");
                self.record.record_failure(err.to_string(), now);
                Err(err)
            }
        };

        self.persist(store)
            .await
            .map_err(|e| AuthError::Persist(e.to_string()))?;
        result
    }

    /// Clears the failure counter and persists the record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Persist` when the record cannot be saved.
    pub async fn reset_tries(&mut self, store: &dyn StateStore) -> Result<(), AuthError> {
        self.record.tries = 0;
        self.persist(store)
            .await
            .map_err(|e| AuthError::Persist(e.to_string()))
    }

    /// Writes the record to `clients.<name>.authorizer`.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` when serialization or saving fails.
    pub async fn persist(&self, store: &dyn StateStore) -> Result<(), StoreError> {
        let value = serde_json::to_value(&self.record)?;
        store
            .set_save(&KeyPath::client_authorizer(&self.client), value)
            .await
            .map_err(|e| {
                error!(client = %self.client, error = %e, "cache write failed");
                e
            })
    }
}

impl fmt::Debug for AuthorizationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationController")
            .field("client", &self.client)
            .field("record", &self.record)
            .field("in_flight", &self.in_flight.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::GraphQLRequest;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns queued outcomes in order, failing once the queue is empty.
    struct Scripted(Mutex<Vec<Result<HeaderParameters, AuthError>>>);

    impl Scripted {
        fn new(mut outcomes: Vec<Result<HeaderParameters, AuthError>>) -> Box<Self> {
            outcomes.reverse();
            Box::new(Self(Mutex::new(outcomes)))
        }
    }

    #[async_trait]
    impl Authorizer for Scripted {
        async fn authorize(&self) -> Result<HeaderParameters, AuthError> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(AuthError::Failed("exhausted".to_string())))
        }
    }

    fn token(value: &str) -> HeaderParameters {
        HeaderParameters::from([("Authorization".to_string(), value.to_string())])
    }

    fn controller(outcomes: Vec<Result<HeaderParameters, AuthError>>) -> AuthorizationController {
        AuthorizationController::new(
            "local",
            Scripted::new(outcomes),
            AuthorizerRecord::new("qi-test", json!({"secret": "s"})),
        )
    }

    #[test]
    fn test_record_transitions() {
        let mut record = AuthorizerRecord::new("qi-bearer", Value::Null);
        assert_eq!(record.state(), AuthState::Unauthenticated);
        assert!(record.can_retry());

        let t = Utc::now();
        record.record_failure("nope", t);
        assert_eq!(record.tries, 1);
        assert_eq!(record.called, 1);
        assert_eq!(record.state(), AuthState::Failed);
        assert_eq!(record.last_error, Some(t));
        assert!(!record.can_retry());

        record.record_success(token("t"), t);
        assert_eq!(record.tries, 0);
        assert_eq!(record.called, 2);
        assert_eq!(record.status, Some(AuthStatus::Ok));
        assert_eq!(record.last_success, Some(t));
        assert!(record.parameters.is_some());

        record.record_failure("again", t);
        assert_eq!(record.parameters, None);
    }

    #[test]
    fn test_record_serialization_omits_credentials() {
        let mut record = AuthorizerRecord::new("qi-basic", json!({"password": "p"}));
        record.record_failure("bad password", Utc::now());

        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("credentials").is_none());
        assert_eq!(value["maxCalls"], json!(1));
        assert_eq!(value["status"], json!({"failed": {"message": "bad password"}}));

        let back: AuthorizerRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.tries, 1);
        assert_eq!(back.credentials, Value::Null);
    }

    #[test]
    fn test_record_defaults_when_deserializing() {
        let record: AuthorizerRecord = serde_json::from_value(json!({"source": "qi-bearer"})).unwrap();
        assert_eq!(record.max_calls, DEFAULT_MAX_CALLS);
        assert_eq!(record.tries, 0);
        assert_eq!(record.status, None);
    }

    #[test]
    fn test_with_bookkeeping_from() {
        let mut persisted = AuthorizerRecord::new("old", Value::Null);
        persisted.record_success(token("cached"), Utc::now());
        persisted.max_calls = 5;

        let merged = AuthorizerRecord::new("qi-bearer", json!({"token": "x"}))
            .with_bookkeeping_from(&persisted);
        assert_eq!(merged.source, "qi-bearer");
        assert_eq!(merged.max_calls, DEFAULT_MAX_CALLS);
        assert_eq!(merged.called, 1);
        assert_eq!(merged.parameters, Some(token("cached")));
    }

    #[tokio::test]
    async fn test_authorize_success_persists_before_returning() {
        let store = MemoryStore::new();
        let mut controller = controller(vec![Ok(token("t1"))]);

        controller.authorize(&store).await.unwrap();
        assert_eq!(controller.state(), AuthState::Authenticated);

        let persisted = store.get(&KeyPath::client_authorizer("local")).await.unwrap();
        assert_eq!(persisted["tries"], json!(0));
        assert_eq!(persisted["called"], json!(1));
        assert_eq!(persisted["status"], json!("ok"));
        assert_eq!(persisted["parameters"], json!({"Authorization": "t1"}));
        assert!(persisted.get("credentials").is_none());
    }

    #[tokio::test]
    async fn test_authorize_failure_then_recovery() {
        let store = MemoryStore::new();
        let mut controller = controller(vec![
            Err(AuthError::Failed("denied".to_string())),
            Ok(token("t2")),
        ]);

        let err = controller.authorize(&store).await.unwrap_err();
        assert_eq!(err, AuthError::Failed("denied".to_string()));
        assert_eq!(controller.state(), AuthState::Failed);
        assert!(!controller.can_retry());
        let persisted = store.get(&KeyPath::client_authorizer("local")).await.unwrap();
        assert_eq!(persisted["tries"], json!(1));
        assert!(persisted.get("parameters").is_none());

        controller.authorize(&store).await.unwrap();
        assert_eq!(controller.record().tries, 0);
        assert_eq!(controller.record().called, 2);
        assert!(controller.can_retry());
    }

    #[tokio::test]
    async fn test_enhance_uses_stored_parameters() {
        let store = MemoryStore::new();
        let mut controller = controller(vec![Ok(token("t3"))]);
        let envelope = RequestEnvelope::new(GraphQLRequest::new("{ a }".to_string()));

        let before = controller.enhance(envelope.clone());
        assert_eq!(before.header("Authorization"), None);

        controller.authorize(&store).await.unwrap();
        let after = controller.enhance(envelope);
        assert_eq!(after.header("Authorization"), Some("t3"));
    }

    /// Waits for the gate before succeeding.
    struct Gated(Arc<tokio::sync::Notify>);

    #[async_trait]
    impl Authorizer for Gated {
        async fn authorize(&self) -> Result<HeaderParameters, AuthError> {
            self.0.notified().await;
            Ok(token("gated"))
        }
    }

    #[tokio::test]
    async fn test_in_flight_is_lowered_when_attempt_is_dropped() {
        let store = MemoryStore::new();
        let gate = Arc::new(tokio::sync::Notify::new());
        let mut controller = AuthorizationController::new(
            "local",
            Box::new(Gated(gate.clone())),
            AuthorizerRecord::new("qi-test", Value::Null),
        );
        let flag = controller.in_flight();

        {
            let attempt = controller.authorize(&store);
            tokio::pin!(attempt);
            tokio::select! {
                _ = &mut attempt => panic!("attempt finished before the gate opened"),
                _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
            }
            assert!(flag.is_set());
        }

        assert!(!flag.is_set());
        assert_eq!(controller.state(), AuthState::Unauthenticated);
        assert_eq!(controller.record().called, 0);

        gate.notify_one();
        controller.authorize(&store).await.unwrap();
        assert!(!flag.is_set());
        assert_eq!(controller.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_reset_tries() {
        let store = MemoryStore::new();
        let mut controller = controller(vec![]);
        assert!(controller.authorize(&store).await.is_err());
        assert!(!controller.can_retry());

        controller.reset_tries(&store).await.unwrap();
        assert!(controller.can_retry());
        let persisted = store.get(&KeyPath::client_authorizer("local")).await.unwrap();
        assert_eq!(persisted["tries"], json!(0));
    }
}
