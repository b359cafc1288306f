//! Query response models.
//!
//! This module defines the successful response envelope returned by a client
//! together with the timing breakdown collected by the transport.

use super::request::{Headers, RequestEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timing phases of a single HTTP exchange, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    /// Time from the start of the call until the request was handed to the network.
    pub request: f64,

    /// Time from sending the request until the response head arrived.
    pub first_byte: f64,

    /// Time spent reading the response body.
    pub download: f64,

    /// Total wall-clock time of the exchange.
    pub total: f64,
}

/// A successful response from a GraphQL server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Parsed JSON body (`{data, errors, extensions}`).
    pub body: Value,

    /// Response headers.
    pub headers: Headers,

    /// HTTP status code.
    pub status_code: u16,

    /// Timing breakdown.
    pub timings: Timings,

    /// The URL that was called.
    pub request_url: String,

    /// The exact envelope that produced this response.
    pub req: RequestEnvelope,
}

impl QueryResponse {
    /// Returns the `data` member of the body, if it is present and not null.
    pub fn data(&self) -> Option<&Value> {
        self.body.get("data").filter(|d| !d.is_null())
    }

    /// Returns the `errors` member of the body when it is a non-empty array.
    pub fn errors(&self) -> Option<&Vec<Value>> {
        self.body
            .get("errors")
            .and_then(Value::as_array)
            .filter(|e| !e.is_empty())
    }
}
