use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strand_types::ToolDefinition;

use crate::error::ConversionError;

/// Function tool in the OpenAI-compatible `tools` array shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
    pub strict: bool,
}

pub fn convert_tools(tools: &[ToolDefinition]) -> Result<Vec<FunctionTool>, ConversionError> {
    tools.iter().map(convert_tool).collect()
}

/// Convert one tool definition.
///
/// Native tools are sent with `strict: true`, which requires every declared
/// property to be listed in `required`. MCP tools are sent with `strict: false`
/// and keep their own `required` list since their parameters are often
/// optional. Both get `additionalProperties: false` on every object schema.
pub fn convert_tool(tool: &ToolDefinition) -> Result<FunctionTool, ConversionError> {
    let strict = !tool.is_mcp();
    let parameters = prepare_parameters(&tool.name, &tool.schema, strict)?;
    Ok(FunctionTool {
        tool_type: "function".to_string(),
        function: FunctionSpec {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters,
            strict,
        },
    })
}

/// Rewrite a tool's JSON schema for the given strictness.
pub fn prepare_parameters(
    tool_name: &str,
    schema: &Value,
    strict: bool,
) -> Result<Value, ConversionError> {
    let mut root = match schema {
        Value::Object(map) => map.clone(),
        Value::Null => match json!({"type": "object", "properties": {}}) {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        other => {
            return Err(ConversionError::InvalidToolSchema {
                tool: tool_name.to_string(),
                reason: format!("expected a JSON object, got {}", json_kind(other)),
            })
        }
    };

    match root.get("type") {
        None => {
            root.insert("type".to_string(), Value::String("object".to_string()));
        }
        Some(_) if is_object_schema(&root) => {}
        Some(other) => {
            return Err(ConversionError::InvalidToolSchema {
                tool: tool_name.to_string(),
                reason: format!("root schema must be an object, got type {}", other),
            })
        }
    }

    rewrite_object(&mut root, strict);
    Ok(Value::Object(root))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_object_schema(schema: &Map<String, Value>) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == "object",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("object")),
        _ => schema.contains_key("properties"),
    }
}

fn rewrite_object(schema: &mut Map<String, Value>, strict: bool) {
    if is_object_schema(schema) {
        schema.insert("additionalProperties".to_string(), Value::Bool(false));

        if strict {
            let declared: Vec<Value> = schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| props.keys().cloned().map(Value::String).collect())
                .unwrap_or_default();
            schema.insert("required".to_string(), Value::Array(declared));
        }
    }

    if let Some(Value::Object(props)) = schema.get_mut("properties") {
        for prop in props.values_mut() {
            rewrite_value(prop, strict);
        }
    }

    for key in ["items", "prefixItems", "anyOf", "oneOf", "allOf", "not"] {
        if let Some(child) = schema.get_mut(key) {
            rewrite_value(child, strict);
        }
    }

    for key in ["$defs", "definitions"] {
        if let Some(Value::Object(defs)) = schema.get_mut(key) {
            for def in defs.values_mut() {
                rewrite_value(def, strict);
            }
        }
    }
}

fn rewrite_value(value: &mut Value, strict: bool) {
    match value {
        Value::Object(map) => rewrite_object(map, strict),
        Value::Array(items) => {
            for item in items {
                rewrite_value(item, strict);
            }
        }
        _ => {}
    }
}
