//! Query error types.
//!
//! [`QueryError`] is the aggregate of everything that can go wrong while
//! executing a query. [`QueryFailure`] carries it together with the request
//! envelope that was sent, so a failure can be printed verbatim.

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::executor::TransportError;
use crate::graphql::ParseError;
use crate::models::RequestEnvelope;
use crate::store::StoreError;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while executing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The operation document is invalid. Never retried.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The client or server wiring is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The request failed in transport or with an error status.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Authorization failed or its outcome could not be recorded.
    #[error(transparent)]
    Authorization(#[from] AuthError),

    /// Extracted state could not be persisted.
    ///
    /// The in-memory state already holds the extracted values.
    #[error("Failed to persist client state: {0}")]
    Persist(#[from] StoreError),
}

/// A failed query with its diagnostics.
#[derive(Debug)]
pub struct QueryFailure {
    /// What went wrong.
    pub error: QueryError,

    /// The envelope that was sent, when the failure happened after building it.
    pub req: Option<RequestEnvelope>,

    /// HTTP status code, when the server answered.
    pub status_code: Option<u16>,

    /// Set when the server answered 401 and no further authorization attempt
    /// was made for this call.
    pub authorization_exhausted: bool,
}

impl QueryFailure {
    /// Wraps `error` without a request.
    pub fn new(error: QueryError) -> Self {
        let status_code = match &error {
            QueryError::Transport(err) => err.status_code(),
            _ => None,
        };
        Self {
            error,
            req: None,
            status_code,
            authorization_exhausted: false,
        }
    }

    /// Attaches the request envelope.
    pub fn with_request(mut self, req: RequestEnvelope) -> Self {
        self.req = Some(req);
        self
    }

    /// Marks the authorization retry budget as exhausted.
    pub fn authorization_exhausted(mut self) -> Self {
        self.authorization_exhausted = true;
        self
    }

    /// The response body of an error status, if any.
    pub fn body(&self) -> Option<&Value> {
        match &self.error {
            QueryError::Transport(TransportError::Status { body, .. }) => Some(body),
            _ => None,
        }
    }
}

impl From<QueryError> for QueryFailure {
    fn from(error: QueryError) -> Self {
        Self::new(error)
    }
}

impl From<ParseError> for QueryFailure {
    fn from(error: ParseError) -> Self {
        Self::new(error.into())
    }
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if self.authorization_exhausted {
            write!(f, " (authorization already tried)")?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
