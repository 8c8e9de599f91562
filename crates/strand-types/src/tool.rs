use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Reserved prefix for tools proxied from an MCP server: `mcp--<server>--<tool>`.
pub const MCP_TOOL_PREFIX: &str = "mcp--";

static MCP_TOOL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^mcp--([^\s]+?)--([^\s]+)$").expect("valid MCP tool name pattern"));

pub fn is_mcp_tool_name(name: &str) -> bool {
    MCP_TOOL_NAME.is_match(name)
}

/// Split an MCP tool name into `(server, tool)`.
pub fn parse_mcp_tool_name(name: &str) -> Option<(&str, &str)> {
    let caps = MCP_TOOL_NAME.captures(name)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

pub fn mcp_tool_name(server: &str, tool: &str) -> String {
    format!("{}{}--{}", MCP_TOOL_PREFIX, server, tool)
}

/// A tool offered to the model for one outbound turn.
///
/// `is_mcp` is computed from the name when the definition is built and cannot
/// be changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawToolDefinition")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: serde_json::Value,
    #[serde(rename = "isMcp")]
    is_mcp: bool,
}

#[derive(Deserialize)]
struct RawToolDefinition {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "input_schema", alias = "inputSchema", alias = "parameters")]
    schema: serde_json::Value,
}

impl From<RawToolDefinition> for ToolDefinition {
    fn from(raw: RawToolDefinition) -> Self {
        ToolDefinition::new(raw.name, raw.description, raw.schema)
    }
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        schema: serde_json::Value,
    ) -> Self {
        let name = name.into();
        let is_mcp = is_mcp_tool_name(&name);
        Self {
            name,
            description,
            schema,
            is_mcp,
        }
    }

    pub fn is_mcp(&self) -> bool {
        self.is_mcp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_mcp_names() {
        assert!(is_mcp_tool_name("mcp--github--create_issue"));
        assert!(is_mcp_tool_name("mcp--my-server--search"));
        assert!(!is_mcp_tool_name("read_file"));
        assert!(!is_mcp_tool_name("mcp--missing_tool_part"));
    }

    #[test]
    fn parses_server_and_tool() {
        assert_eq!(
            parse_mcp_tool_name("mcp--github--create_issue"),
            Some(("github", "create_issue"))
        );
        assert_eq!(parse_mcp_tool_name("write_to_file"), None);
        assert_eq!(
            mcp_tool_name("github", "create_issue"),
            "mcp--github--create_issue"
        );
    }

    #[test]
    fn deserialization_derives_is_mcp_and_ignores_input_flag() {
        let tool: ToolDefinition = serde_json::from_value(json!({
            "name": "read_file",
            "description": "Read a file",
            "parameters": {"type": "object", "properties": {}},
            "isMcp": true
        }))
        .unwrap();
        assert!(!tool.is_mcp());

        let mcp: ToolDefinition = serde_json::from_value(json!({
            "name": "mcp--jira--search",
            "inputSchema": {"type": "object"}
        }))
        .unwrap();
        assert!(mcp.is_mcp());
    }
}
