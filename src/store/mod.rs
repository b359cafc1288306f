//! Persistent key-path store.
//!
//! Client state and authorizer bookkeeping live in a JSON document addressed
//! by key paths such as `clients.<name>.state`. The pipeline only depends on
//! the [`StateStore`] trait; [`JsonFileStore`] persists to a file on disk and
//! [`MemoryStore`] keeps everything in memory.
//!
//! Writes are scoped by key path, so distinct clients never collide, but the
//! store offers no per-key locking: two writers racing on the same key path
//! resolve as last-writer-wins.

pub mod json_file;
pub mod memory;

pub use json_file::{JsonFileStore, StoreOptions};
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file is not valid JSON, or the document could not be serialized.
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backing file holds valid JSON that is not an object.
    #[error("store file {path} does not contain a JSON object")]
    NotAnObject {
        /// File being loaded.
        path: PathBuf,
    },
}

/// A dot-delimited path into the store document.
///
/// Segments are kept separately, so a client whose name contains a dot can
/// still be addressed with [`KeyPath::from_segments`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// The root of the document.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parses a dotted path. An empty string is the root.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self(dotted.split('.').map(str::to_string).collect())
    }

    /// Builds a path from individual segments without splitting them.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// `clients.<name>`
    pub fn client(name: &str) -> Self {
        Self::from_segments(["clients", name])
    }

    /// `clients.<name>.state`
    pub fn client_state(name: &str) -> Self {
        Self::client(name).child("state")
    }

    /// `clients.<name>.authorizer`
    pub fn client_authorizer(name: &str) -> Self {
        Self::client(name).child("authorizer")
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// The individual segments of the path.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for KeyPath {
    fn from(dotted: &str) -> Self {
        Self::parse(dotted)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Key-path access to a durable JSON document.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads the value at `path`, or `None` when any segment is missing.
    async fn get(&self, path: &KeyPath) -> Option<Value>;

    /// Writes `value` at `path` in memory only.
    async fn set(&self, path: &KeyPath, value: Value);

    /// Writes `value` at `path` and persists the whole document.
    ///
    /// The in-memory mutation is kept even when persisting fails.
    async fn set_save(&self, path: &KeyPath, value: Value) -> Result<(), StoreError> {
        self.set(path, value).await;
        self.save().await
    }

    /// Persists the current document.
    async fn save(&self) -> Result<(), StoreError>;
}

/// Reads the value at `path` inside `root`.
///
/// Object members are looked up by name; array elements by a numeric segment.
pub fn get_path<'a>(root: &'a Value, path: &KeyPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Associates `value` at `path` inside `root`, creating intermediate objects.
///
/// Intermediate values that are not objects are replaced by objects, so the
/// write always succeeds. Writing to the root replaces the whole document.
pub fn assoc_path(root: &mut Value, path: &KeyPath, value: Value) {
    let Some((last, parents)) = path.segments().split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        node = as_object_mut(node)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    as_object_mut(node).insert(last.clone(), value);
}

fn as_object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_path_parse_and_display() {
        let path = KeyPath::parse("clients.local.state");
        assert_eq!(path.segments(), ["clients", "local", "state"]);
        assert_eq!(path.to_string(), "clients.local.state");
        assert!(KeyPath::parse("").is_root());
    }

    #[test]
    fn test_client_paths_do_not_split_names() {
        let path = KeyPath::client_state("eu.prod");
        assert_eq!(path.segments(), ["clients", "eu.prod", "state"]);
    }

    #[test]
    fn test_get_path() {
        let doc = json!({"clients": {"a": {"state": {"token": "t", "ids": [1, 2]}}}});
        assert_eq!(
            get_path(&doc, &KeyPath::parse("clients.a.state.token")),
            Some(&json!("t"))
        );
        assert_eq!(
            get_path(&doc, &KeyPath::parse("clients.a.state.ids.1")),
            Some(&json!(2))
        );
        assert_eq!(get_path(&doc, &KeyPath::parse("clients.b.state")), None);
        assert_eq!(get_path(&doc, &KeyPath::root()), Some(&doc));
    }

    #[test]
    fn test_assoc_path_creates_intermediate_objects() {
        let mut doc = json!({});
        assoc_path(&mut doc, &KeyPath::parse("clients.a.state"), json!({"x": 1}));
        assert_eq!(doc, json!({"clients": {"a": {"state": {"x": 1}}}}));
    }

    #[test]
    fn test_assoc_path_preserves_siblings() {
        let mut doc = json!({"clients": {"a": {"state": {"x": 1}}, "b": {}}});
        assoc_path(&mut doc, &KeyPath::parse("clients.a.state.y"), json!(2));
        assert_eq!(
            doc,
            json!({"clients": {"a": {"state": {"x": 1, "y": 2}}, "b": {}}})
        );
    }

    #[test]
    fn test_assoc_path_replaces_scalars_on_the_way() {
        let mut doc = json!({"clients": "oops"});
        assoc_path(&mut doc, &KeyPath::parse("clients.a"), json!(true));
        assert_eq!(doc, json!({"clients": {"a": true}}));
    }

    #[test]
    fn test_assoc_path_root_replaces_document() {
        let mut doc = json!({"a": 1});
        assoc_path(&mut doc, &KeyPath::root(), json!({"b": 2}));
        assert_eq!(doc, json!({"b": 2}));
    }
}
