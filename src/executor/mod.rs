//! GraphQL transport.
//!
//! A [`Server`] wraps a `reqwest` client configured from [`ServerSettings`]:
//! the endpoint URL, default headers and a timeout. Requests are never
//! retried by the transport and redirects are not followed. Every status of
//! 400 or above is reported as [`TransportError::Status`].

pub mod error;
pub mod timing;

pub use error::TransportError;
pub use timing::{format_timings, TimingCheckpoints};

use crate::config::{validate_url, ConfigError, ServerSettings};
use crate::models::{Headers, QueryResponse, RequestEnvelope, Timings};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// The raw result of a successful exchange.
#[derive(Debug, Clone)]
pub struct ServerReply {
    /// Parsed JSON body, or null when the body was empty.
    pub body: Value,

    /// Response headers.
    pub headers: Headers,

    /// HTTP status code.
    pub status_code: u16,

    /// Timing breakdown.
    pub timings: Timings,

    /// The URL that was called.
    pub request_url: String,
}

impl ServerReply {
    /// Attaches the envelope that produced this reply.
    pub fn into_response(self, req: RequestEnvelope) -> QueryResponse {
        QueryResponse {
            body: self.body,
            headers: self.headers,
            status_code: self.status_code,
            timings: self.timings,
            request_url: self.request_url,
            req,
        }
    }
}

/// A configured GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct Server {
    name: String,
    url: Url,
    headers: Headers,
    timeout: Duration,
    http: reqwest::Client,
}

impl Server {
    /// Builds the transport for the server `name`.
    ///
    /// # Arguments
    ///
    /// * `name` - Server name from the settings
    /// * `settings` - URL, default headers and timeout
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the URL or a default header is invalid, or
    /// the HTTP client cannot be created.
    pub fn new(name: impl Into<String>, settings: &ServerSettings) -> Result<Self, ConfigError> {
        let name = name.into();
        let url = validate_url(&name, &settings.url)?;
        let default_headers = header_map(&name, &settings.headers)?;

        let http = reqwest::Client::builder()
            .timeout(settings.timeout_duration())
            .redirect(Policy::none())
            .default_headers(default_headers)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                server: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            url,
            headers: settings.headers.clone(),
            timeout: settings.timeout_duration(),
            http,
        })
    }

    /// Server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Headers sent with every request.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `envelope` as a JSON POST.
    ///
    /// Envelope headers take precedence over the server's default headers.
    ///
    /// # Arguments
    ///
    /// * `envelope` - The request body and per-call headers
    ///
    /// # Returns
    ///
    /// The parsed reply, or a `TransportError` for network failures, error
    /// statuses and bodies that are not JSON.
    pub async fn send(&self, envelope: &RequestEnvelope) -> Result<ServerReply, TransportError> {
        let mut checkpoints = TimingCheckpoints::new();

        let mut request = self.http.post(self.url.clone()).json(&envelope.body);
        for (name, value) in &envelope.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        checkpoints.mark_request_sent();
        let response = request.send().await?;
        checkpoints.mark_first_byte_received();

        let status_code = response.status().as_u16();
        let request_url = response.url().to_string();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let bytes = response.bytes().await?;
        checkpoints.mark_response_complete();
        let timings = checkpoints.to_timings();

        debug!(
            server = %self.name,
            status = status_code,
            total_ms = timings.total,
            "response received"
        );

        let parsed = parse_body(&bytes);
        if status_code >= 400 {
            let body = parsed
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            return Err(TransportError::Status {
                status: status_code,
                body,
            });
        }

        Ok(ServerReply {
            body: parsed.map_err(|e| TransportError::InvalidBody(e.to_string()))?,
            headers,
            status_code,
            timings,
            request_url,
        })
    }
}

fn parse_body(bytes: &[u8]) -> Result<Value, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        Ok(Value::Null)
    } else {
        serde_json::from_slice(bytes)
    }
}

fn header_map(server: &str, headers: &Headers) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let invalid = || ConfigError::InvalidHeader {
            server: server.to_string(),
            header: name.clone(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::GraphQLRequest;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn envelope() -> RequestEnvelope {
        RequestEnvelope::new(
            GraphQLRequest::new("{ viewer { id } }".to_string())
                .with_variables(Some(json!({"id": "1"}))),
        )
    }

    fn server_for(mock: &MockServer) -> Server {
        let mut settings = ServerSettings::new(format!("{}/graphql", mock.uri()));
        settings
            .headers
            .insert("X-Env".to_string(), "test".to_string());
        settings
            .headers
            .insert("Authorization".to_string(), "default".to_string());
        Server::new("dev", &settings).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_settings() {
        assert!(matches!(
            Server::new("dev", &ServerSettings::new("")),
            Err(ConfigError::MissingUrl { .. })
        ));

        let mut settings = ServerSettings::new("http://localhost/graphql");
        settings
            .headers
            .insert("Bad Header".to_string(), "x".to_string());
        assert!(matches!(
            Server::new("dev", &settings),
            Err(ConfigError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_posts_json_with_headers() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("x-env", "test"))
            .and(header("authorization", "per-call"))
            .and(body_json(json!({
                "operationName": null,
                "query": "{ viewer { id } }",
                "variables": {"id": "1"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-request-id", "r1")
                    .set_body_json(json!({"data": {"viewer": {"id": "1"}}})),
            )
            .expect(1)
            .mount(&mock)
            .await;

        let server = server_for(&mock);
        let mut env = envelope();
        env.headers
            .insert("Authorization".to_string(), "per-call".to_string());

        let reply = server.send(&env).await.unwrap();
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.body["data"]["viewer"]["id"], json!("1"));
        assert_eq!(reply.headers.get("x-request-id").map(String::as_str), Some("r1"));
        assert!(reply.request_url.ends_with("/graphql"));
        assert!(reply.timings.total >= reply.timings.first_byte);
    }

    #[tokio::test]
    async fn test_send_error_status() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})),
            )
            .mount(&mock)
            .await;

        let err = server_for(&mock).send(&envelope()).await.unwrap_err();
        assert!(err.is_unauthorized());
        match err {
            TransportError::Status { body, .. } => {
                assert_eq!(body, json!({"message": "Unauthorized"}))
            }
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_error_status_with_text_body() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&mock)
            .await;

        match server_for(&mock).send(&envelope()).await {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, json!("Bad Gateway"));
            }
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_invalid_body() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&mock)
            .await;

        let err = server_for(&mock).send(&envelope()).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn test_send_does_not_follow_redirects() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/elsewhere"))
            .expect(1)
            .mount(&mock)
            .await;
        Mock::given(path("/elsewhere"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock)
            .await;

        let reply = server_for(&mock).send(&envelope()).await.unwrap();
        assert_eq!(reply.status_code, 302);
        assert_eq!(reply.body, Value::Null);
    }

    #[tokio::test]
    async fn test_send_timeout() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": null}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock)
            .await;

        let mut settings = ServerSettings::new(mock.uri());
        settings.timeout = 50;
        let server = Server::new("slow", &settings).unwrap();

        let err = server.send(&envelope()).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }
}
