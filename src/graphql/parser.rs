//! GraphQL document parsing.
//!
//! Documents are parsed with `graphql_parser` and checked to contain exactly
//! one operation definition. Fragment definitions may accompany it.
//!
//! # Example
//!
//! ```
//! use qi_client::graphql::parser::{operation_name, parse_document, variables_in_document};
//!
//! let doc = parse_document("query device($id: ID!) { device(id: $id) { id } }").unwrap();
//! assert_eq!(operation_name(&doc).unwrap().as_deref(), Some("device"));
//! assert_eq!(variables_in_document(&doc), vec!["id".to_string()]);
//! ```

use super::ParseError;
use graphql_parser::query::{
    parse_query, Definition, Directive, Document, OperationDefinition, Selection, SelectionSet,
    Value as GqlValue, VariableDefinition,
};

/// A parsed document with owned names.
pub type ParsedDocument<'a> = Document<'a, String>;

/// Parses `text` into a document holding exactly one operation.
///
/// # Errors
///
/// - `ParseError::EmptyDocument` for blank input
/// - `ParseError::Syntax` when the text is not valid GraphQL
/// - `ParseError::NoOperation` / `ParseError::MultipleOperations` when the
///   document does not contain exactly one operation
pub fn parse_document(text: &str) -> Result<ParsedDocument<'_>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }

    let document =
        parse_query::<String>(text).map_err(|e| ParseError::Syntax(e.to_string()))?;
    single_operation(&document)?;
    Ok(document)
}

/// Returns the document's single operation definition.
///
/// # Errors
///
/// Returns `ParseError::NoOperation` or `ParseError::MultipleOperations`.
pub fn single_operation<'d, 'a>(
    document: &'d ParsedDocument<'a>,
) -> Result<&'d OperationDefinition<'a, String>, ParseError> {
    let mut operations = document.definitions.iter().filter_map(|d| match d {
        Definition::Operation(op) => Some(op),
        Definition::Fragment(_) => None,
    });

    match (operations.next(), operations.count()) {
        (None, _) => Err(ParseError::NoOperation),
        (Some(op), 0) => Ok(op),
        (Some(_), rest) => Err(ParseError::MultipleOperations(rest + 1)),
    }
}

/// Returns the name of the document's operation, or `None` if it is anonymous.
///
/// # Errors
///
/// Returns a `ParseError` when the document does not hold exactly one operation.
pub fn operation_name(document: &ParsedDocument<'_>) -> Result<Option<String>, ParseError> {
    let name = match single_operation(document)? {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.clone(),
        OperationDefinition::Mutation(m) => m.name.clone(),
        OperationDefinition::Subscription(s) => s.name.clone(),
    };
    Ok(name)
}

/// Lists every variable name the document declares or uses.
///
/// Declarations come first, followed by usages in source order. Each name
/// appears once, without the `$`.
pub fn variables_in_document(document: &ParsedDocument<'_>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let found = document.definitions.iter().flat_map(definition_variables);
    for name in found {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn definition_variables(definition: &Definition<'_, String>) -> Vec<String> {
    match definition {
        Definition::Operation(OperationDefinition::SelectionSet(set)) => set_variables(set),
        Definition::Operation(OperationDefinition::Query(q)) => {
            operation_variables(&q.variable_definitions, &q.directives, &q.selection_set)
        }
        Definition::Operation(OperationDefinition::Mutation(m)) => {
            operation_variables(&m.variable_definitions, &m.directives, &m.selection_set)
        }
        Definition::Operation(OperationDefinition::Subscription(s)) => {
            operation_variables(&s.variable_definitions, &s.directives, &s.selection_set)
        }
        Definition::Fragment(f) => directive_variables(&f.directives)
            .into_iter()
            .chain(set_variables(&f.selection_set))
            .collect(),
    }
}

fn operation_variables(
    definitions: &[VariableDefinition<'_, String>],
    directives: &[Directive<'_, String>],
    selection_set: &SelectionSet<'_, String>,
) -> Vec<String> {
    definitions
        .iter()
        .flat_map(|d| {
            std::iter::once(d.name.clone())
                .chain(d.default_value.iter().flat_map(value_variables))
        })
        .chain(directive_variables(directives))
        .chain(set_variables(selection_set))
        .collect()
}

fn set_variables(set: &SelectionSet<'_, String>) -> Vec<String> {
    set.items
        .iter()
        .flat_map(|selection| match selection {
            Selection::Field(field) => field
                .arguments
                .iter()
                .flat_map(|(_, value)| value_variables(value))
                .chain(directive_variables(&field.directives))
                .chain(set_variables(&field.selection_set))
                .collect::<Vec<_>>(),
            Selection::FragmentSpread(spread) => directive_variables(&spread.directives),
            Selection::InlineFragment(inline) => directive_variables(&inline.directives)
                .into_iter()
                .chain(set_variables(&inline.selection_set))
                .collect(),
        })
        .collect()
}

fn directive_variables(directives: &[Directive<'_, String>]) -> Vec<String> {
    directives
        .iter()
        .flat_map(|d| d.arguments.iter().flat_map(|(_, value)| value_variables(value)))
        .collect()
}

fn value_variables(value: &GqlValue<'_, String>) -> Vec<String> {
    match value {
        GqlValue::Variable(name) => vec![name.clone()],
        GqlValue::List(items) => items.iter().flat_map(value_variables).collect(),
        GqlValue::Object(fields) => fields.values().flat_map(value_variables).collect(),
        _ => Vec::new(),
    }
}
