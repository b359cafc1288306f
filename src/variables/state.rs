//! State variable resolution.
//!
//! A *state reference* is a variable name or string value starting with
//! [`STATE_PREFIX`]. References are resolved against the client's persisted
//! state (`clients.<name>.state`) before a request is sent:
//!
//! - A declared variable `$__STATE__token` is bound to `state.token`.
//! - A caller variable value `"__STATE__token"` is replaced by `state.token`.
//!
//! Caller values win over state-derived values at matching leaves; see
//! [`merge_deep_left`].

use crate::graphql::{variables_in_document, ParsedDocument};
use crate::store::{KeyPath, StateStore};
use serde_json::{Map, Value};

/// Marks a variable name or value as a state reference.
pub const STATE_PREFIX: &str = "__STATE__";

/// Variable names of a document, split by origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarUsage {
    /// State keys referenced by prefixed names, prefix stripped.
    pub from_state: Vec<String>,

    /// Names the caller must supply.
    pub from_outside: Vec<String>,
}

/// The variables payload for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum VariablePayload {
    /// Variables to send.
    Bound(Map<String, Value>),

    /// The document needs no variables and none were given.
    Unbound,

    /// The document declares variables, but the caller supplied none and
    /// none could be derived from state. The request is sent with
    /// `variables: null`; callers decide whether to warn or fail.
    Missing,
}

impl VariablePayload {
    /// The value for the request body's `variables` member.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            VariablePayload::Bound(map) => Some(Value::Object(map.clone())),
            VariablePayload::Unbound | VariablePayload::Missing => None,
        }
    }

    /// Returns true for [`VariablePayload::Missing`].
    pub fn is_missing(&self) -> bool {
        matches!(self, VariablePayload::Missing)
    }
}

/// Strips [`STATE_PREFIX`] from `value`, returning the state key.
pub fn state_key(value: &str) -> Option<&str> {
    value.strip_prefix(STATE_PREFIX)
}

/// Splits variable names into state references and outside variables.
pub fn which_vars<I, S>(names: I) -> VarUsage
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .fold(VarUsage::default(), |mut usage, name| {
            let name = name.as_ref();
            match state_key(name) {
                Some(key) => usage.from_state.push(key.to_string()),
                None => usage.from_outside.push(name.to_string()),
            }
            usage
        })
}

/// State keys referenced by the document's variable names.
pub fn used_state_variables(document: &ParsedDocument<'_>) -> Vec<String> {
    which_vars(variables_in_document(document)).from_state
}

/// Variables the caller has to supply for the document.
pub fn used_outside_variables(document: &ParsedDocument<'_>) -> Vec<String> {
    which_vars(variables_in_document(document)).from_outside
}

/// Builds the state-derived part of the variables.
///
/// Each key listed in `names` that exists in `state` is copied under its
/// prefixed name. Dotted names become nested objects.
///
/// # Arguments
///
/// * `names` - State keys, prefix already stripped
/// * `state` - The client's state
///
/// # Returns
///
/// An object keyed by `__STATE__<name>`; missing keys are left out.
pub fn state_variables_object(names: &[String], state: &Map<String, Value>) -> Map<String, Value> {
    let mut document = Value::Object(Map::new());
    for name in names {
        if let Some(value) = state.get(name) {
            let prefixed = format!("{}{}", STATE_PREFIX, name);
            crate::store::assoc_path(&mut document, &KeyPath::parse(&prefixed), value.clone());
        }
    }

    match document {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Replaces state references inside caller variable values.
///
/// Objects are walked recursively. Arrays are passed through untouched.
/// String leaves carrying the prefix are replaced by the matching state value,
/// or `null` when the state has no such key. Other scalars pass through.
pub fn variables_with_state_vars(
    variables: &Map<String, Value>,
    state: &Map<String, Value>,
) -> Map<String, Value> {
    variables
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, state)))
        .collect()
}

fn resolve_value(value: &Value, state: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) => match state_key(s) {
            Some(key) => state.get(key).cloned().unwrap_or(Value::Null),
            None => value.clone(),
        },
        Value::Object(map) => Value::Object(variables_with_state_vars(map, state)),
        _ => value.clone(),
    }
}

/// Deep-merges two objects, `left` winning on conflicts.
///
/// When both sides hold an object under the same key the objects are merged
/// recursively. For any other conflict the value from `left` is kept. Keys
/// present on only one side are kept as they are.
pub fn merge_deep_left(
    left: Map<String, Value>,
    mut right: Map<String, Value>,
) -> Map<String, Value> {
    for (key, value) in left {
        let merged = match (value, right.remove(&key)) {
            (Value::Object(l), Some(Value::Object(r))) => Value::Object(merge_deep_left(l, r)),
            (l, _) => l,
        };
        right.insert(key, merged);
    }
    right
}

/// Computes the variables payload from a state snapshot.
///
/// The final variables are the caller variables with value references
/// resolved, deep-merged over the state-derived object, caller winning.
pub fn resolve(
    document: &ParsedDocument<'_>,
    caller: Option<&Map<String, Value>>,
    state: &Map<String, Value>,
) -> VariablePayload {
    let declared = variables_in_document(document);
    let usage = which_vars(&declared);
    let from_state = state_variables_object(&usage.from_state, state);

    match caller {
        Some(variables) => {
            VariablePayload::Bound(merge_deep_left(variables_with_state_vars(variables, state), from_state))
        }
        None if !from_state.is_empty() => VariablePayload::Bound(from_state),
        None if declared.is_empty() => VariablePayload::Unbound,
        None => VariablePayload::Missing,
    }
}

/// Reads the state of `client` from `store`.
///
/// A missing or non-object entry reads as empty state.
pub async fn client_state(store: &dyn StateStore, client: &str) -> Map<String, Value> {
    match store.get(&KeyPath::client_state(client)).await {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Resolves the variables of `document` for `client` against the store.
///
/// # Arguments
///
/// * `document` - The parsed operation
/// * `caller` - Variables supplied by the caller, if any
/// * `client` - Name of the client whose state is used
/// * `store` - The state store
pub async fn resolve_variables(
    document: &ParsedDocument<'_>,
    caller: Option<&Map<String, Value>>,
    client: &str,
    store: &dyn StateStore,
) -> VariablePayload {
    let state = client_state(store, client).await;
    resolve(document, caller, &state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::parse_document;
    use crate::store::MemoryStore;
    use proptest::prelude::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn test_which_vars() {
        let usage = which_vars(["id", "__STATE__token", "limit"]);
        assert_eq!(usage.from_state, vec!["token"]);
        assert_eq!(usage.from_outside, vec!["id", "limit"]);
    }

    #[test]
    fn test_used_variables_by_origin() {
        let doc = parse_document(
            "query q($id: ID!, $__STATE__token: String) { user(id: $id, token: $__STATE__token) { id } }",
        )
        .unwrap();
        assert_eq!(used_state_variables(&doc), vec!["token"]);
        assert_eq!(used_outside_variables(&doc), vec!["id"]);
    }

    #[test]
    fn test_value_reference_is_replaced() {
        let resolved = variables_with_state_vars(
            &object(json!({"a": "__STATE__b"})),
            &object(json!({"b": 42})),
        );
        assert_eq!(Value::Object(resolved), json!({"a": 42}));
    }

    #[test]
    fn test_value_references_nested_arrays_and_missing() {
        let resolved = variables_with_state_vars(
            &object(json!({
                "input": {"owner": "__STATE__owner", "n": 3, "ok": true},
                "ids": ["__STATE__owner"],
                "gone": "__STATE__nope",
                "plain": "hello"
            })),
            &object(json!({"owner": "u-1"})),
        );

        assert_eq!(
            Value::Object(resolved),
            json!({
                "input": {"owner": "u-1", "n": 3, "ok": true},
                "ids": ["__STATE__owner"],
                "gone": null,
                "plain": "hello"
            })
        );
    }

    #[test]
    fn test_state_variables_object_prefixes_and_nests() {
        let state = object(json!({"token": "t", "a.b": 1, "unused": 0}));
        let names = vec!["token".to_string(), "a.b".to_string(), "missing".to_string()];

        assert_eq!(
            Value::Object(state_variables_object(&names, &state)),
            json!({"__STATE__token": "t", "__STATE__a": {"b": 1}})
        );
    }

    #[test]
    fn test_merge_deep_left_caller_wins_at_leaves() {
        let caller = object(json!({"x": 1, "nested": {"a": "caller"}}));
        let state = object(json!({"x": 2, "y": 3, "nested": {"a": "state", "b": "state"}}));

        assert_eq!(
            Value::Object(merge_deep_left(caller, state)),
            json!({"x": 1, "y": 3, "nested": {"a": "caller", "b": "state"}})
        );
    }

    #[test]
    fn test_merge_deep_left_object_vs_scalar() {
        let caller = object(json!({"k": "scalar"}));
        let state = object(json!({"k": {"deep": true}}));
        assert_eq!(Value::Object(merge_deep_left(caller, state)), json!({"k": "scalar"}));
    }

    #[test]
    fn test_resolve_payloads() {
        let needs_id = parse_document("query q($id: ID!) { user(id: $id) { id } }").unwrap();
        assert_eq!(resolve(&needs_id, None, &Map::new()), VariablePayload::Missing);

        let caller = object(json!({"id": "7"}));
        assert_eq!(
            resolve(&needs_id, Some(&caller), &Map::new()),
            VariablePayload::Bound(caller.clone())
        );

        let no_vars = parse_document("{ viewer { id } }").unwrap();
        assert_eq!(resolve(&no_vars, None, &Map::new()), VariablePayload::Unbound);
        assert_eq!(VariablePayload::Unbound.to_value(), None);
    }

    #[test]
    fn test_resolve_state_only_payload() {
        let doc =
            parse_document("query q($__STATE__token: String) { me(token: $__STATE__token) { id } }")
                .unwrap();
        let state = object(json!({"token": "abc"}));

        assert_eq!(
            resolve(&doc, None, &state).to_value(),
            Some(json!({"__STATE__token": "abc"}))
        );
    }

    #[test]
    fn test_resolve_state_only_without_stored_value_is_missing() {
        let doc =
            parse_document("query q($__STATE__token: String!) { me(token: $__STATE__token) { id } }")
                .unwrap();

        assert_eq!(resolve(&doc, None, &Map::new()), VariablePayload::Missing);

        let other_keys = object(json!({"userId": "u1"}));
        assert_eq!(resolve(&doc, None, &other_keys), VariablePayload::Missing);
    }

    #[tokio::test]
    async fn test_resolve_variables_reads_client_state() {
        let store = MemoryStore::with_document(json!({
            "clients": {"a": {"state": {"b": 42}}, "other": {"state": {"b": 0}}}
        }));
        let doc = parse_document("query q($a: Int) { f(a: $a) }").unwrap();
        let caller = object(json!({"a": "__STATE__b"}));

        let payload = resolve_variables(&doc, Some(&caller), "a", &store).await;
        assert_eq!(payload.to_value(), Some(json!({"a": 42})));
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
            "[a-d]".prop_map(|k| Value::String(format!("{}{}", STATE_PREFIX, k))),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        json_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-d]", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn json_object() -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map("[a-e]", json_value(), 0..5)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_resolution_is_idempotent(caller in json_object(), state in json_object()) {
            let doc = parse_document(
                "query q($__STATE__a: Int, $__STATE__b: Int, $x: Int) { f(a: $__STATE__a, b: $__STATE__b, x: $x) }",
            )
            .unwrap();

            let first = resolve(&doc, Some(&caller), &state);
            let second = resolve(&doc, Some(&caller), &state);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_merge_keeps_every_caller_leaf(caller in json_object(), state in json_object()) {
            let merged = merge_deep_left(caller.clone(), state.clone());
            for (key, value) in &caller {
                if !value.is_object() {
                    prop_assert_eq!(merged.get(key), Some(value));
                }
            }
            for key in state.keys() {
                prop_assert!(merged.contains_key(key));
            }
        }
    }
}
