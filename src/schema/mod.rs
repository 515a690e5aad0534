//! Output schemas for structured LLM responses.
//!
//! A reasoning strategy names the schema its answers must satisfy by id; the
//! parsing decorators look the schema up here, render it as JSON Schema for
//! providers that constrain decoding server-side, and validate parsed objects
//! against it. Strategies and the orchestrator never see schema internals.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Kind of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldKind {
    fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.json_type())
    }
}

/// Specification of one output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// A field-level schema violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum SchemaViolation {
    NotAnObject,
    MissingField { field: String, expected: FieldKind },
    TypeMismatch { field: String, expected: FieldKind, got: String },
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "expected a JSON object"),
            Self::MissingField { field, expected } => {
                write!(f, "missing required field '{}' ({})", field, expected)
            }
            Self::TypeMismatch {
                field,
                expected,
                got,
            } => write!(
                f,
                "field '{}' has wrong type: expected {}, got {}",
                field, expected, got
            ),
        }
    }
}

/// An output schema: an id plus an ordered field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub id: String,
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn new(id: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Schema for the direct-answer strategy: `{answer: string}`.
    pub fn direct_answer() -> Self {
        Self::new(
            "direct_answer",
            vec![FieldSpec::new("answer", FieldKind::String)],
        )
    }

    /// Schema for chain-of-thought: `{answer: string, reasoning: string}`.
    pub fn chain_of_thought() -> Self {
        Self::new(
            "chain_of_thought",
            vec![
                FieldSpec::new("answer", FieldKind::String),
                FieldSpec::new("reasoning", FieldKind::String),
            ],
        )
    }

    /// Render as a JSON Schema object suitable for provider-side enforcement.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(
                field.name.clone(),
                json!({ "type": field.kind.json_type() }),
            );
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": Value::Array(required),
            "additionalProperties": false,
        })
    }

    /// Validate a parsed object against the field list.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<SchemaViolation>> {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return Err(vec![SchemaViolation::NotAnObject]),
        };

        let mut violations = Vec::new();
        for field in &self.fields {
            match obj.get(&field.name) {
                Some(v) => {
                    if !field.kind.matches(v) {
                        violations.push(SchemaViolation::TypeMismatch {
                            field: field.name.clone(),
                            expected: field.kind,
                            got: value_type_name(v).to_string(),
                        });
                    }
                }
                None if field.required => violations.push(SchemaViolation::MissingField {
                    field: field.name.clone(),
                    expected: field.kind,
                }),
                None => {}
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Registry mapping schema ids to schemas.
///
/// Built once at startup with the built-in schemas; read-only during a run.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<OutputSchema>>,
}

impl SchemaRegistry {
    /// Registry with the built-in schemas.
    pub fn builtin() -> Self {
        let mut registry = Self {
            schemas: HashMap::new(),
        };
        registry.register(OutputSchema::direct_answer());
        registry.register(OutputSchema::chain_of_thought());
        registry
    }

    pub fn register(&mut self, schema: OutputSchema) {
        self.schemas.insert(schema.id.clone(), Arc::new(schema));
    }

    pub fn get(&self, id: &str) -> Option<Arc<OutputSchema>> {
        self.schemas.get(id).cloned()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
