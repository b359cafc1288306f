//! Query selection: which client, operation and variables a command uses.
//!
//! A [`QuerySelection`] holds whatever the user named on the command line.
//! Resolving it yields a [`QueryPlan`]: the parameters that could be
//! determined, the choices still to be made, and errors or warnings per
//! field.

use crate::client::QueryParams;
use serde::Serialize;
use serde_json::{Map, Value};

/// What the user asked for. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySelection {
    /// Client name.
    pub client: Option<String>,
    /// Query name (file stem).
    pub query: Option<String>,
    /// Name of a variable set in the query's vars file.
    pub vars: Option<String>,
}

/// Options to choose from, per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Choices {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vars: Option<Vec<String>>,
}

impl Choices {
    /// Whether nothing is left to choose.
    pub fn is_empty(&self) -> bool {
        self.client.is_none() && self.query.is_none() && self.vars.is_none()
    }
}

/// Messages per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vars: Option<String>,
}

impl Diagnostics {
    /// Whether there are no messages.
    pub fn is_empty(&self) -> bool {
        self.client.is_none() && self.query.is_none() && self.vars.is_none()
    }
}

/// The selected operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedQuery {
    pub name: String,
    pub content: String,
}

/// The selected variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VarsSelection {
    /// The operation takes no outside variables.
    NotNeeded,
    /// A named set from the vars file.
    Named {
        name: String,
        data: Map<String, Value>,
    },
}

impl VarsSelection {
    /// Variables to send, if any.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        match self {
            VarsSelection::NotNeeded => None,
            VarsSelection::Named { data, .. } => Some(data),
        }
    }
}

/// Parameters determined so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<SelectedQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vars: Option<VarsSelection>,
}

impl SelectedParams {
    /// The client name and query params, once both client and query are
    /// known and variables are settled.
    pub fn to_query_params(&self) -> Option<(String, QueryParams)> {
        let client = self.client.clone()?;
        let query = self.query.as_ref()?;
        let vars = self.vars.as_ref()?;

        let mut params = QueryParams::new(query.content.clone());
        params.variables = vars.data().cloned();
        Some((client, params))
    }
}

/// Outcome of resolving a [`QuerySelection`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryPlan {
    /// Choices the user still has to make.
    pub select: Choices,
    /// Problems that stop the command.
    pub errors: Diagnostics,
    /// Notices that do not.
    pub warnings: Diagnostics,
    /// What was resolved.
    pub params: SelectedParams,
}

impl QueryPlan {
    /// Whether the plan can be executed as is.
    pub fn is_ready(&self) -> bool {
        self.errors.is_empty() && self.select.is_empty() && self.params.to_query_params().is_some()
    }
}
