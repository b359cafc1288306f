//! The `@setParameter` directive processor.
//!
//! Processing a document removes every `@setParameter` usage and returns an
//! [`ExtractionPlan`]: one entry per usage, in source order, holding the
//! parameter name and the path of the annotated node inside the response's
//! `data` object.
//!
//! Paths are built from response keys. A field contributes its alias when it
//! has one, otherwise its name. Operations, inline fragments, fragment spreads
//! and fragment definitions contribute nothing, so a directive inside a
//! fragment definition yields a path relative to wherever the fragment is
//! spread. A directive on the operation itself yields the empty path, which
//! resolves to the whole `data` object.
//!
//! Other directives such as `@include` and `@skip` are left in place.

use super::parser::{parse_document, single_operation, ParsedDocument};
use super::ParseError;
use graphql_parser::query::{
    Definition, Directive, OperationDefinition, Selection, SelectionSet, Value as GqlValue,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the extraction directive, without the `@`.
pub const EXTRACT_DIRECTIVE: &str = "setParameter";

/// The argument holding the parameter name.
const NAME_ARGUMENT: &str = "name";

/// One step of a response path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// An object member, by response key.
    Field(String),
    /// A list element.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// A single `@setParameter` usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    /// State key the value is stored under.
    pub name: String,

    /// Path of the value inside the response's `data` object.
    pub response_path: Vec<PathSegment>,
}

impl Extraction {
    /// Resolves this extraction against `data`.
    ///
    /// A path that does not exist resolves to `Value::Null`.
    pub fn resolve(&self, data: &Value) -> Value {
        resolve_path(data, &self.response_path)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Ordered extractions for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionPlan(pub Vec<Extraction>);

impl ExtractionPlan {
    /// Returns true if the document had no extraction directives.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of extractions, including repeated names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the extractions in source order.
    pub fn iter(&self) -> impl Iterator<Item = &Extraction> {
        self.0.iter()
    }

    /// Applies the plan to a response's `data` object.
    ///
    /// Entries are applied in order, so when a name repeats the later entry
    /// wins. Missing paths produce `null` rather than an error.
    ///
    /// # Arguments
    ///
    /// * `data` - The `data` member of a GraphQL response
    ///
    /// # Returns
    ///
    /// The extracted values keyed by parameter name.
    pub fn apply(&self, data: &Value) -> Map<String, Value> {
        self.0
            .iter()
            .map(|extraction| (extraction.name.clone(), extraction.resolve(data)))
            .collect()
    }
}

/// A document with its extraction directives removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedDocument {
    /// The re-printed document, ready to send.
    pub document: String,

    /// What to extract from the response.
    pub plan: ExtractionPlan,
}

/// Parses `text` and processes its extraction directives.
///
/// # Errors
///
/// Returns a `ParseError` if the text is not a valid single-operation
/// document or a directive has no string `name` argument.
pub fn process_directives(text: &str) -> Result<ProcessedDocument, ParseError> {
    process_parsed(parse_document(text)?)
}

/// Processes the extraction directives of an already parsed document.
///
/// # Errors
///
/// Same as [`process_directives`], minus syntax errors.
pub fn process_parsed(mut document: ParsedDocument<'_>) -> Result<ProcessedDocument, ParseError> {
    single_operation(&document)?;

    let mut extractions = Vec::new();
    for definition in &mut document.definitions {
        extractions.extend(strip_definition(definition)?);
    }

    Ok(ProcessedDocument {
        document: document.to_string(),
        plan: ExtractionPlan(extractions),
    })
}

/// Resolves `path` inside `data`.
///
/// Field segments index objects and index segments index arrays; anything
/// else is a miss.
pub fn resolve_path<'a>(data: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(data, |node, segment| match (segment, node) {
        (PathSegment::Field(key), Value::Object(map)) => map.get(key),
        (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
        _ => None,
    })
}

fn strip_definition(
    definition: &mut Definition<'_, String>,
) -> Result<Vec<Extraction>, ParseError> {
    let root: &[PathSegment] = &[];
    match definition {
        Definition::Operation(OperationDefinition::SelectionSet(set)) => strip_set(set, root),
        Definition::Operation(OperationDefinition::Query(q)) => {
            strip_operation(&mut q.directives, &mut q.selection_set)
        }
        Definition::Operation(OperationDefinition::Mutation(m)) => {
            strip_operation(&mut m.directives, &mut m.selection_set)
        }
        Definition::Operation(OperationDefinition::Subscription(s)) => {
            strip_operation(&mut s.directives, &mut s.selection_set)
        }
        Definition::Fragment(fragment) => {
            let mut found = strip_directives(&mut fragment.directives, root)?;
            found.extend(strip_set(&mut fragment.selection_set, root)?);
            Ok(found)
        }
    }
}

fn strip_operation(
    directives: &mut Vec<Directive<'_, String>>,
    selection_set: &mut SelectionSet<'_, String>,
) -> Result<Vec<Extraction>, ParseError> {
    let mut found = strip_directives(directives, &[])?;
    found.extend(strip_set(selection_set, &[])?);
    Ok(found)
}

fn strip_set(
    set: &mut SelectionSet<'_, String>,
    path: &[PathSegment],
) -> Result<Vec<Extraction>, ParseError> {
    let mut found = Vec::new();
    for selection in &mut set.items {
        match selection {
            Selection::Field(field) => {
                let key = field.alias.clone().unwrap_or_else(|| field.name.clone());
                let field_path = [path, &[PathSegment::Field(key)]].concat();
                found.extend(strip_directives(&mut field.directives, &field_path)?);
                found.extend(strip_set(&mut field.selection_set, &field_path)?);
            }
            Selection::FragmentSpread(spread) => {
                found.extend(strip_directives(&mut spread.directives, path)?);
            }
            Selection::InlineFragment(inline) => {
                found.extend(strip_directives(&mut inline.directives, path)?);
                found.extend(strip_set(&mut inline.selection_set, path)?);
            }
        }
    }
    Ok(found)
}

/// Removes extraction directives from `directives`, keeping all others.
fn strip_directives(
    directives: &mut Vec<Directive<'_, String>>,
    path: &[PathSegment],
) -> Result<Vec<Extraction>, ParseError> {
    let (extract, keep): (Vec<_>, Vec<_>) = std::mem::take(directives)
        .into_iter()
        .partition(|d| d.name == EXTRACT_DIRECTIVE);
    *directives = keep;

    extract
        .iter()
        .map(|directive| {
            Ok(Extraction {
                name: name_argument(directive)?,
                response_path: path.to_vec(),
            })
        })
        .collect()
}

fn name_argument(directive: &Directive<'_, String>) -> Result<String, ParseError> {
    let invalid = |reason: &str| ParseError::InvalidDirective {
        directive: EXTRACT_DIRECTIVE.to_string(),
        reason: reason.to_string(),
    };

    match directive.arguments.iter().find(|(name, _)| name == NAME_ARGUMENT) {
        Some((_, GqlValue::String(name))) => Ok(name.clone()),
        Some(_) => Err(invalid("`name` must be a string literal")),
        None => Err(invalid("missing `name` argument")),
    }
}
