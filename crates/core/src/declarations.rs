//! Translation of provider tool descriptors into function declarations.
//!
//! Provider schemas are loosely typed JSON. They are parsed here, once, into
//! the tagged [`Schema`] the live protocol accepts; anything without a
//! recognizable type becomes a string.

use crate::provider::ToolDescriptor;
use gemini_realtime_types::{FunctionDeclaration, Schema};
use serde_json::Value;
use std::collections::BTreeMap;

pub fn to_function_declarations(descriptors: &[ToolDescriptor]) -> Vec<FunctionDeclaration> {
    descriptors.iter().map(to_function_declaration).collect()
}

/// Builds the declaration for one tool. The parameters are always an object
/// schema; a tool without properties gets no `parameters` at all.
pub fn to_function_declaration(descriptor: &ToolDescriptor) -> FunctionDeclaration {
    let properties = properties_of(&descriptor.parameters);
    let parameters = if properties.is_empty() {
        None
    } else {
        let required = required_of(&descriptor.parameters, &properties);
        Some(Schema::Object {
            description: None,
            properties,
            required,
        })
    };

    FunctionDeclaration {
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        parameters,
    }
}

/// Parses one JSON-schema node.
pub fn parse_schema(value: &Value) -> Schema {
    let description = value
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    match type_name(value) {
        Some("object") => {
            let properties = properties_of(value);
            let required = required_of(value, &properties);
            Schema::Object {
                description,
                properties,
                required,
            }
        }
        Some("array") => Schema::Array {
            description,
            items: Box::new(
                value
                    .get("items")
                    .map(parse_schema)
                    .unwrap_or_else(|| Schema::string(None)),
            ),
        },
        Some("number") => Schema::Number { description },
        Some("integer") => Schema::Integer { description },
        Some("boolean") => Schema::Boolean { description },
        _ => Schema::String {
            description,
            enum_values: enum_values(value),
        },
    }
}

/// The declared type, skipping `"null"` in union types. An untyped node with
/// `properties` is treated as an object.
fn type_name(value: &Value) -> Option<&str> {
    match value.get("type") {
        Some(Value::String(name)) => Some(name.as_str()),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null"),
        _ if value.get("properties").is_some_and(Value::is_object) => Some("object"),
        _ => None,
    }
}

fn properties_of(value: &Value) -> BTreeMap<String, Schema> {
    value
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| (name.clone(), parse_schema(prop)))
                .collect()
        })
        .unwrap_or_default()
}

/// Required names, limited to properties that actually exist.
fn required_of(value: &Value, properties: &BTreeMap<String, Schema>) -> Vec<String> {
    value
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| properties.contains_key(*name))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn enum_values(value: &Value) -> Vec<String> {
    value
        .get("enum")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
