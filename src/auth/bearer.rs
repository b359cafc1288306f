//! Bearer token authorizer (`qi-bearer`).
//!
//! A static token from the client settings, sent as
//! `Authorization: Bearer <token>` (RFC 6750).

use super::{required_credential, AuthError, Authorizer, HeaderParameters};
use async_trait::async_trait;
use serde_json::Value;

/// Registry kind of this authorizer.
pub const KIND: &str = "qi-bearer";

/// Formats a token into a Bearer authentication header value.
///
/// # Arguments
///
/// * `token` - The authentication token
///
/// # Returns
///
/// A `String` in the format "Bearer <token>"
///
/// # Examples
///
/// ```
/// use qi_client::auth::bearer::bearer_token;
///
/// let auth_header = bearer_token("abc123xyz");
/// assert_eq!(auth_header, "Bearer abc123xyz");
/// ```
pub fn bearer_token(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Authorizer that always yields the configured bearer token.
#[derive(Debug, Clone)]
pub struct BearerAuthorizer {
    token: String,
}

impl BearerAuthorizer {
    /// Creates the authorizer for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Builds the authorizer from `{ "token": "..." }`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` if `token` is missing or empty.
    pub fn from_credentials(credentials: &Value) -> Result<Self, AuthError> {
        Ok(Self::new(required_credential(credentials, KIND, "token")?))
    }
}

#[async_trait]
impl Authorizer for BearerAuthorizer {
    async fn authorize(&self) -> Result<HeaderParameters, AuthError> {
        Ok(HeaderParameters::from([(
            "Authorization".to_string(),
            bearer_token(&self.token),
        )]))
    }
}
