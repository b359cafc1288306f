//! Transport error types.
//!
//! This module defines the errors that can occur while sending a request to a
//! GraphQL server, including HTTP error statuses, timeouts and network issues.

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during a GraphQL exchange.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The server answered with a status of 400 or above.
    ///
    /// The body is kept (parsed as JSON when possible) so that GraphQL error
    /// lists returned with the status can still be shown.
    #[error("Response code {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, or null when it was empty.
        body: Value,
    },

    /// Request timed out before completion.
    #[error("Request timed out")]
    Timeout,

    /// Network error occurred during request execution.
    ///
    /// This includes connection failures, DNS resolution errors,
    /// and TLS failures.
    #[error("Network error: {0}")]
    Network(String),

    /// The request could not be built.
    #[error("Request build error: {0}")]
    Build(String),

    /// The response body is not valid JSON.
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

impl TransportError {
    /// The HTTP status code, when the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is an HTTP 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }
}

/// Convert reqwest errors to TransportError.
///
/// Maps reqwest's error types to our variants for consistent error handling
/// throughout the client.
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::Build(err.to_string())
        } else if err.is_decode() {
            TransportError::InvalidBody(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let status = TransportError::Status {
            status: 401,
            body: json!({"message": "Unauthorized"}),
        };
        assert_eq!(format!("{}", status), "Response code 401");

        let network_err = TransportError::Network("Connection refused".to_string());
        assert_eq!(
            format!("{}", network_err),
            "Network error: Connection refused"
        );

        assert_eq!(format!("{}", TransportError::Timeout), "Request timed out");
    }

    #[test]
    fn test_status_code_and_unauthorized() {
        let unauthorized = TransportError::Status {
            status: 401,
            body: Value::Null,
        };
        assert_eq!(unauthorized.status_code(), Some(401));
        assert!(unauthorized.is_unauthorized());

        let forbidden = TransportError::Status {
            status: 403,
            body: Value::Null,
        };
        assert!(!forbidden.is_unauthorized());

        assert_eq!(TransportError::Timeout.status_code(), None);
        assert!(!TransportError::Timeout.is_unauthorized());
    }
}
