use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The parameter schema of a function declaration.
///
/// This is the tagged subset of OpenAPI schema objects that the service accepts
/// for tool parameters. Enumerations are string schemas with a non-empty
/// `enum` list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schema {
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default)]
        properties: BTreeMap<String, Schema>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
    },
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        items: Box<Schema>,
    },
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
        enum_values: Vec<String>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Boolean {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl Schema {
    /// A plain string schema, the fallback for anything untyped.
    pub fn string(description: Option<String>) -> Self {
        Schema::String {
            description,
            enum_values: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_schema_serializes_lowercase_types() {
        let schema = Schema::Object {
            description: None,
            properties: BTreeMap::from([
                ("query".to_string(), Schema::string(Some("Search text".into()))),
                (
                    "mode".to_string(),
                    Schema::String {
                        description: None,
                        enum_values: vec!["fast".into(), "full".into()],
                    },
                ),
                (
                    "tags".to_string(),
                    Schema::Array {
                        description: None,
                        items: Box::new(Schema::string(None)),
                    },
                ),
            ]),
            required: vec!["query".to_string()],
        };

        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "mode": { "type": "string", "enum": ["fast", "full"] },
                    "query": { "type": "string", "description": "Search text" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["query"]
            })
        );
    }

    #[test]
    fn test_empty_required_is_omitted() {
        let schema = Schema::Object {
            description: None,
            properties: BTreeMap::from([("n".to_string(), Schema::Integer { description: None })]),
            required: vec![],
        };
        let value = serde_json::to_value(&schema).unwrap();
        assert!(value.get("required").is_none());
        assert_eq!(value["properties"]["n"]["type"], "integer");
    }
}
