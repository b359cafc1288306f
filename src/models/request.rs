//! Request envelope models.
//!
//! A request envelope is the exact payload handed to the transport: the
//! GraphQL body plus any headers added by an authorizer. It is kept verbatim
//! on every response and failure so it can be printed for debugging.

use crate::graphql::GraphQLRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header name/value pairs.
///
/// A `BTreeMap` keeps printed envelopes stable between runs.
pub type Headers = BTreeMap<String, String>;

/// The request sent to a GraphQL server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// JSON body: `{operationName, query, variables}`.
    pub body: GraphQLRequest,

    /// Per-call headers, merged over the server's default headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,
}

impl RequestEnvelope {
    /// Creates an envelope with no per-call headers.
    pub fn new(body: GraphQLRequest) -> Self {
        Self {
            body,
            headers: Headers::new(),
        }
    }

    /// Merges `headers` into the envelope, replacing existing values.
    ///
    /// Header names are compared case-insensitively so that an authorizer
    /// replacing `authorization` does not leave a stale `Authorization`.
    pub fn merge_headers(&mut self, headers: &Headers) {
        for (name, value) in headers {
            self.headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
            self.headers.insert(name.clone(), value.clone());
        }
    }

    /// Looks up a header value case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
