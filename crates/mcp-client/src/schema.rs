//! Tool parameter schemas and argument validation.
//!
//! Only the subset of JSON Schema that MCP servers put in `inputSchema` is
//! checked: the top-level object shape, `required`, primitive `type`s of
//! declared properties and `additionalProperties: false`. Anything else is
//! left for the server to judge.

use serde_json::{Map, Value};

use mcx_domain::tool::RAW_ARGUMENTS_KEY;

/// A tool's `inputSchema`, with the parts used for validation extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    raw: Value,
    properties: Map<String, Value>,
    required: Vec<String>,
    allows_additional: bool,
}

impl ToolSchema {
    pub fn new(raw: Value) -> Self {
        let properties = raw
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let required = raw
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let allows_additional = !matches!(raw.get("additionalProperties"), Some(Value::Bool(false)));

        Self {
            raw,
            properties,
            required,
            allows_additional,
        }
    }

    /// The schema as advertised by the server.
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Check `arguments` against this schema. A JSON `null` is treated as
    /// an empty argument object.
    pub fn check(&self, arguments: &Value) -> Result<(), String> {
        let empty = Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => return Err(format!("arguments must be a JSON object, got {}", type_name(other))),
        };

        if let Some(raw) = args.get(RAW_ARGUMENTS_KEY) {
            if !self.properties.contains_key(RAW_ARGUMENTS_KEY) {
                let text = raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());
                return Err(format!("arguments are not valid JSON: {text}"));
            }
        }

        for name in &self.required {
            if !args.contains_key(name) {
                return Err(format!("missing required argument '{name}'"));
            }
        }

        for (name, value) in args {
            match self.properties.get(name) {
                Some(prop) => {
                    if !matches_declared_type(prop, value) {
                        return Err(format!(
                            "argument '{name}' must be of type {}, got {}",
                            declared_types(prop).join(" or "),
                            type_name(value)
                        ));
                    }
                }
                None if !self.allows_additional => {
                    return Err(format!("unexpected argument '{name}'"));
                }
                None => {}
            }
        }

        Ok(())
    }
}

fn declared_types(prop: &Value) -> Vec<&str> {
    match prop.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn matches_declared_type(prop: &Value, value: &Value) -> bool {
    let types = declared_types(prop);
    types.is_empty() || types.iter().any(|t| matches_type(t, value))
}

fn matches_type(ty: &str, value: &Value) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        // Unknown type keywords are not ours to enforce.
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
