//! GraphQL support for qi.
//!
//! This module provides the request body sent over HTTP, the response shape
//! returned by servers, document parsing, and the `@setParameter` directive
//! processor that turns a document into an extraction plan.
//!
//! # GraphQL over HTTP
//!
//! GraphQL requests are sent via HTTP POST with a JSON body containing:
//! - `operationName`: Name of the single operation in the document, or null
//! - `query`: The GraphQL document as text
//! - `variables`: JSON object with variable values, or null
//!
//! # Extraction directives
//!
//! ```graphql
//! mutation login($user: String!) {
//!   login(user: $user) {
//!     token @setParameter(name: "token")
//!   }
//! }
//! ```
//!
//! The directive is stripped before sending. After a successful response the
//! value at `data.login.token` is written to the client's state under
//! `token`, where a later query can reference it as `$__STATE__token`.

pub mod directives;
pub mod introspection;
pub mod parser;

pub use directives::{
    process_directives, process_parsed, Extraction, ExtractionPlan, PathSegment,
    ProcessedDocument, EXTRACT_DIRECTIVE,
};
pub use parser::{operation_name, parse_document, variables_in_document, ParsedDocument};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The JSON body of a GraphQL request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    /// Name of the operation, or null for anonymous operations.
    pub operation_name: Option<String>,

    /// The GraphQL document as sent to the server.
    pub query: String,

    /// Variable values, or null when the operation takes none.
    pub variables: Option<Value>,
}

impl GraphQLRequest {
    /// Creates a request with just a query.
    pub fn new(query: String) -> Self {
        Self {
            operation_name: None,
            query,
            variables: None,
        }
    }

    /// Sets the variables.
    pub fn with_variables(mut self, variables: Option<Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Sets the operation name.
    pub fn with_operation_name(mut self, name: Option<String>) -> Self {
        self.operation_name = name;
        self
    }

    /// Checks if this request carries a non-null variables object.
    pub fn has_variables(&self) -> bool {
        self.variables.as_ref().is_some_and(|v| !v.is_null())
    }
}

/// Builds the request body for `document`.
///
/// The operation name is taken from the document's single operation.
///
/// # Errors
///
/// Returns a `ParseError` when the document is not valid or does not hold
/// exactly one operation.
pub fn make_request_body(
    document: &str,
    variables: Option<Value>,
) -> Result<GraphQLRequest, ParseError> {
    let parsed = parse_document(document)?;
    Ok(GraphQLRequest::new(document.to_string())
        .with_operation_name(operation_name(&parsed)?)
        .with_variables(variables))
}

/// Errors that can occur while parsing or rewriting a GraphQL document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The document is empty or contains only whitespace.
    #[error("GraphQL document is empty")]
    EmptyDocument,

    /// The document is not syntactically valid.
    #[error("Invalid GraphQL syntax: {0}")]
    Syntax(String),

    /// The document contains no operation definition.
    #[error("GraphQL document has no operation definition")]
    NoOperation,

    /// The document contains more than one operation definition.
    #[error("GraphQL document has {0} operation definitions, expected exactly one")]
    MultipleOperations(usize),

    /// An extraction directive is missing its `name` argument or it is not a string.
    #[error("Invalid @{directive} directive: {reason}")]
    InvalidDirective {
        /// Directive name.
        directive: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// One entry of a response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<GraphQLErrorLocation>>,

    /// Response path of the failing field, e.g. `["devices", 0, "name"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// A 1-based position in the operation document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// The `{data, errors, extensions}` body of a GraphQL response.
///
/// A 200 response may still carry errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLResponse {
    /// Returns true when the `errors` list is present and non-empty.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Renders the errors one per block, numbered, with locations and path.
    ///
    /// Empty when there are no errors.
    pub fn format_errors(&self) -> String {
        let Some(errors) = self.errors.as_ref().filter(|e| !e.is_empty()) else {
            return String::new();
        };

        let mut out = String::from("GraphQL Errors:\n\n");
        for (n, error) in errors.iter().enumerate() {
            out += &format!("{}. {}\n", n + 1, error.message);
            for location in error.locations.iter().flatten() {
                out += &format!("   at line {}, column {}\n", location.line, location.column);
            }
            if let Some(path) = &error.path {
                let joined: Vec<String> = path.iter().map(ToString::to_string).collect();
                out += &format!("   path: {}\n", joined.join(" > "));
            }
            out.push('\n');
        }
        out
    }
}
