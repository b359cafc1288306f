//! Basic HTTP authorizer (`qi-basic`).
//!
//! Encodes a username and password from the client settings into an
//! `Authorization: Basic ...` header according to RFC 7617.

use super::{required_credential, AuthError, Authorizer, HeaderParameters};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

/// Registry kind of this authorizer.
pub const KIND: &str = "qi-basic";

/// Builds the `Authorization` value for `username` and `password`.
///
/// ```
/// use qi_client::auth::basic::basic_auth;
///
/// assert_eq!(basic_auth("tester", "secret"), "Basic dGVzdGVyOnNlY3JldA==");
/// ```
pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Authorizer for a fixed username and password.
#[derive(Debug, Clone)]
pub struct BasicAuthorizer {
    username: String,
    password: String,
}

impl BasicAuthorizer {
    /// Creates the authorizer.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Builds the authorizer from `{ "username": "...", "password": "..." }`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` naming the first missing field.
    pub fn from_credentials(credentials: &Value) -> Result<Self, AuthError> {
        Ok(Self::new(
            required_credential(credentials, KIND, "username")?,
            required_credential(credentials, KIND, "password")?,
        ))
    }
}

#[async_trait]
impl Authorizer for BasicAuthorizer {
    async fn authorize(&self) -> Result<HeaderParameters, AuthError> {
        Ok(HeaderParameters::from([(
            "Authorization".to_string(),
            basic_auth(&self.username, &self.password),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(header: &str) -> String {
        let encoded = header.strip_prefix("Basic ").unwrap();
        String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn test_basic_auth_value() {
        assert_eq!(basic_auth("tester", "secret"), "Basic dGVzdGVyOnNlY3JldA==");
        assert_eq!(decode(&basic_auth("a@b.c", "x:y")), "a@b.c:x:y");
        assert_eq!(decode(&basic_auth("uživatel", "heslo🔒")), "uživatel:heslo🔒");
    }

    #[test]
    fn test_from_credentials_requires_password() {
        let result = BasicAuthorizer::from_credentials(&json!({"username": "u"}));
        assert_eq!(
            result.err(),
            Some(AuthError::MissingCredentials("qi-basic: missing password".to_string()))
        );
    }

    #[tokio::test]
    async fn test_authorize_yields_header() {
        let authorizer =
            BasicAuthorizer::from_credentials(&json!({"username": "user", "password": "pass"}))
                .unwrap();
        let parameters = authorizer.authorize().await.unwrap();
        assert_eq!(
            parameters.get("Authorization").map(String::as_str),
            Some("Basic dXNlcjpwYXNz")
        );
    }
}
