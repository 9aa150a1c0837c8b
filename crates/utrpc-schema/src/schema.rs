use serde_json::{Map, Value};
use utrpc_wire::{SocketError, Validator};

use crate::config::ValidationConfig;
use crate::error::{Result, SchemaError};

/// A compiled JSON Schema implementing the [`Validator`] capability.
pub struct JsonSchema {
    compiled: jsonschema::Validator,
}

impl JsonSchema {
    /// Compile a schema with default configuration.
    pub fn compile(schema: &Value) -> Result<Self> {
        Self::compile_with(schema, &ValidationConfig::default())
    }

    /// Compile a schema with explicit configuration.
    pub fn compile_with(schema: &Value, config: &ValidationConfig) -> Result<Self> {
        let mut schema = schema.clone();
        if config.strict_mode {
            apply_strict_mode(&mut schema);
        }

        let compiled = jsonschema::validator_for(&schema)
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;

        Ok(Self { compiled })
    }

    /// Parse and compile a schema from a JSON string.
    pub fn parse(schema_json: &str) -> Result<Self> {
        let schema: Value = serde_json::from_str(schema_json)?;
        Self::compile(&schema)
    }

    /// Parse and compile with explicit configuration.
    pub fn parse_with(schema_json: &str, config: &ValidationConfig) -> Result<Self> {
        let schema: Value = serde_json::from_str(schema_json)?;
        Self::compile_with(&schema, config)
    }
}

impl Validator for JsonSchema {
    fn validate(&self, value: &Value) -> std::result::Result<(), SocketError> {
        let mut errors = self.compiled.iter_errors(value);
        if let Some(first) = errors.next() {
            let mut message = first.to_string();
            for err in errors.take(3) {
                message.push_str("; ");
                message.push_str(&err.to_string());
            }
            return Err(SocketError::parse_error(message));
        }

        Ok(())
    }
}

impl std::fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchema").finish_non_exhaustive()
    }
}

// Keywords whose value is a map of schemas, a single schema, or an array of
// schemas. Strict mode recurses through all of them.
const MAP_KEYWORDS: [&str; 4] = ["properties", "patternProperties", "$defs", "definitions"];
const SINGLE_KEYWORDS: [&str; 8] = [
    "items",
    "additionalProperties",
    "propertyNames",
    "contains",
    "not",
    "if",
    "then",
    "else",
];
const ARRAY_KEYWORDS: [&str; 4] = ["prefixItems", "allOf", "anyOf", "oneOf"];

fn apply_strict_mode(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if is_object_schema(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }

            for key in MAP_KEYWORDS {
                if let Some(Value::Object(children)) = map.get_mut(key) {
                    for child in children.values_mut() {
                        apply_strict_mode(child);
                    }
                }
            }
            for key in SINGLE_KEYWORDS {
                if let Some(child) = map.get_mut(key) {
                    apply_strict_mode(child);
                }
            }
            for key in ARRAY_KEYWORDS {
                if let Some(Value::Array(children)) = map.get_mut(key) {
                    for child in children {
                        apply_strict_mode(child);
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                apply_strict_mode(item);
            }
        }
        _ => {}
    }
}

fn is_object_schema(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds
            .iter()
            .any(|kind| matches!(kind, Value::String(k) if k == "object")),
        _ => ["properties", "patternProperties", "required", "propertyNames"]
            .iter()
            .any(|keyword| map.contains_key(*keyword)),
    }
}
