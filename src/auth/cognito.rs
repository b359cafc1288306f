//! AWS Cognito user pool authorizer (`qi-cognito`).
//!
//! Signs in with the `USER_PASSWORD_AUTH` flow of the Cognito Identity
//! Provider `InitiateAuth` API and yields the returned ID token as the
//! `Authorization` header. Challenges (MFA, new password) are not supported
//! and fail the attempt.
//!
//! The app client must have `ALLOW_USER_PASSWORD_AUTH` enabled. SRP-only
//! clients, the default for pools used with the Cognito JavaScript SDK,
//! reject the flow with `InvalidParameterException`, which surfaces as a
//! failed attempt.
//!
//! Credentials:
//!
//! ```json
//! {
//!   "username": "tester",
//!   "password": "secret",
//!   "userPoolId": "eu-west-1_AbCdEf",
//!   "clientId": "2lgv6k9ppeuiejnjkm1lbuksvu"
//! }
//! ```
//!
//! The region is taken from the pool id. An optional `endpoint` member
//! overrides the regional endpoint.

use super::{required_credential, AuthError, Authorizer, HeaderParameters};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Registry kind of this authorizer.
pub const KIND: &str = "qi-cognito";

const TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const AMZ_JSON: &str = "application/x-amz-json-1.1";
const AUTH_FLOW: &str = "USER_PASSWORD_AUTH";
const TIMEOUT_MS: u64 = 10_000;

/// Message for sign-ins that require a second factor.
pub const MFA_NOT_SUPPORTED: &str = "MFA required but currently not supported";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: AuthParameters<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct AuthParameters<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    id_token: String,
}

/// Authorizer signing in to a Cognito user pool.
#[derive(Debug, Clone)]
pub struct CognitoAuthorizer {
    username: String,
    password: String,
    client_id: String,
    endpoint: String,
    http: reqwest::Client,
}

impl CognitoAuthorizer {
    /// Builds the authorizer from its credentials object.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` naming the first missing field,
    /// or when `userPoolId` has no region prefix.
    pub fn from_credentials(credentials: &Value) -> Result<Self, AuthError> {
        let username = required_credential(credentials, KIND, "username")?;
        let password = required_credential(credentials, KIND, "password")?;
        let user_pool_id = required_credential(credentials, KIND, "userPoolId")?;
        let client_id = required_credential(credentials, KIND, "clientId")?;

        let endpoint = match credentials.get("endpoint").and_then(Value::as_str) {
            Some(endpoint) => endpoint.to_string(),
            None => regional_endpoint(user_pool_id)?,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(TIMEOUT_MS))
            .build()
            .map_err(|e| AuthError::Failed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            client_id: client_id.to_string(),
            endpoint,
            http,
        })
    }

    /// The URL sign-in requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Derives `https://cognito-idp.<region>.amazonaws.com/` from a pool id.
fn regional_endpoint(user_pool_id: &str) -> Result<String, AuthError> {
    match user_pool_id.split_once('_') {
        Some((region, _)) if !region.is_empty() => {
            Ok(format!("https://cognito-idp.{}.amazonaws.com/", region))
        }
        _ => Err(AuthError::MissingCredentials(format!(
            "{}: userPoolId \"{}\" has no region prefix",
            KIND, user_pool_id
        ))),
    }
}

#[async_trait]
impl Authorizer for CognitoAuthorizer {
    async fn authorize(&self) -> Result<HeaderParameters, AuthError> {
        let request = InitiateAuthRequest {
            auth_flow: AUTH_FLOW,
            client_id: &self.client_id,
            auth_parameters: AuthParameters {
                username: &self.username,
                password: &self.password,
            },
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| AuthError::Failed(e.to_string()))?;

        debug!(endpoint = %self.endpoint, user = %self.username, "cognito sign-in");
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Amz-Target", TARGET)
            .header(CONTENT_TYPE, AMZ_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| AuthError::Failed(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Failed(format!("Invalid Cognito response: {}", e)))?;

        if !status.is_success() {
            let message = body
                .get("message")
                .or_else(|| body.get("__type"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Cognito returned HTTP {}", status.as_u16()));
            return Err(AuthError::Failed(message));
        }

        let parsed: InitiateAuthResponse = serde_json::from_value(body)
            .map_err(|e| AuthError::Failed(format!("Invalid Cognito response: {}", e)))?;

        if let Some(challenge) = parsed.challenge_name {
            return Err(AuthError::Failed(if challenge.contains("MFA") {
                MFA_NOT_SUPPORTED.to_string()
            } else {
                format!("Challenge {} is not supported", challenge)
            }));
        }

        let result = parsed
            .authentication_result
            .ok_or_else(|| AuthError::Failed("Cognito response has no AuthenticationResult".to_string()))?;

        Ok(HeaderParameters::from([(
            "Authorization".to_string(),
            result.id_token,
        )]))
    }
}
