//! Forum tool catalog
//!
//! Tools are mirrored one-to-one from the MCP server. Every tool except the
//! two wallet bootstrap tools needs a verified session; for those the agent
//! injects the bearer token as `auth_token` before the call leaves the process.

use crate::llm::ToolDefinition;
use crate::mcp::{McpToolDef, McpToolResult};
use serde_json::{json, Map, Value};

/// Issues a one-time challenge for an address
pub const CHALLENGE_TOOL: &str = "get_wallet_challenge";
/// Exchanges a signed challenge for a bearer token
pub const VERIFY_TOOL: &str = "verify_wallet_signature";
/// Tools callable before authentication; never receive a token
pub const AUTH_EXEMPT_TOOLS: [&str; 2] = [CHALLENGE_TOOL, VERIFY_TOOL];
/// Argument name the server expects the bearer token under
pub const AUTH_TOKEN_ARG: &str = "auth_token";

/// Placeholder payload when a tool returns no text block
pub const NO_TEXT_RESULT: &str = "[No text returned by tool]";

const BOOTSTRAP_DESCRIPTION: &str = "This tool is part of the authentication flow. Use it to \
    verify ownership of a wallet address by signing a challenge message. It does not require a \
    verified wallet session.";
const GATED_DESCRIPTION: &str = "This tool requires a verified wallet session (handled via \
    auth_token). Use this when the user requests an action that requires authentication.";

/// Whether calls to `name` carry the bearer token
pub fn requires_auth(name: &str) -> bool {
    !AUTH_EXEMPT_TOOLS.contains(&name)
}

/// One tool as offered to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub requires_auth: bool,
}

impl ToolSpec {
    /// Mirror an MCP definition, filling in defaults the server left out
    pub fn from_mcp(def: McpToolDef) -> Self {
        let requires_auth = requires_auth(&def.name);

        let description = def
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| {
                if requires_auth {
                    GATED_DESCRIPTION.to_string()
                } else {
                    BOOTSTRAP_DESCRIPTION.to_string()
                }
            });

        let input_schema = def
            .input_schema
            .filter(|s| s.is_object())
            .unwrap_or_else(|| {
                if requires_auth {
                    json!({"type": "object", "properties": {}, "required": []})
                } else {
                    json!({
                        "type": "object",
                        "properties": {
                            "address": {
                                "type": "string",
                                "description": "Ethereum wallet address"
                            }
                        },
                        "required": ["address"]
                    })
                }
            });

        Self {
            name: def.name,
            description,
            input_schema,
            requires_auth,
        }
    }

    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }

    /// First sentence of the description, for the system prompt
    pub fn summary(&self) -> &str {
        self.description
            .split('.')
            .next()
            .unwrap_or(&self.description)
            .trim()
    }
}

/// Tool catalog for one user turn
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    specs: Vec<ToolSpec>,
}

impl ToolCatalog {
    pub fn from_mcp(defs: Vec<McpToolDef>) -> Self {
        Self {
            specs: defs.into_iter().map(ToolSpec::from_mcp).collect(),
        }
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.specs.iter().map(ToolSpec::to_definition).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }
}

/// Arguments for `name` with the bearer token added where required
///
/// Exempt tools and calls made without a token get their arguments unchanged.
/// Non-object arguments are replaced by an object so the token has a home.
pub fn with_auth_token(name: &str, arguments: Value, token: Option<&str>) -> Value {
    let Some(token) = token.filter(|_| requires_auth(name)) else {
        return arguments;
    };

    let mut object = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            tracing::warn!(tool = name, "Tool arguments were not an object: {}", other);
            Map::new()
        }
    };
    object.insert(AUTH_TOKEN_ARG.to_string(), Value::String(token.to_string()));
    Value::Object(object)
}

/// Tool outcome as fed back to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    /// First text payload of an MCP result, truncated to `max_chars`
    pub fn from_mcp(result: &McpToolResult, max_chars: usize) -> Self {
        let text = result.first_text().unwrap_or(NO_TEXT_RESULT);
        Self {
            content: truncate_with_ellipsis(text, max_chars),
            is_error: result.is_error,
        }
    }

    /// A call that failed before producing a result
    pub fn failure(error: &anyhow::Error) -> Self {
        Self {
            content: format!("Tool error: {:#}", error),
            is_error: true,
        }
    }
}

/// Keep at most `max_chars` characters, appending `...` when anything was cut
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::McpContent;

    #[test]
    fn test_requires_auth() {
        assert!(!requires_auth("get_wallet_challenge"));
        assert!(!requires_auth("verify_wallet_signature"));
        assert!(requires_auth("add_reaction"));
        assert!(requires_auth("search_forum"));
    }

    #[test]
    fn test_bootstrap_tool_gets_address_schema() {
        let spec = ToolSpec::from_mcp(McpToolDef::new(CHALLENGE_TOOL));
        assert!(!spec.requires_auth);
        assert_eq!(spec.input_schema["required"], json!(["address"]));
        assert!(spec.description.starts_with("This tool is part of the authentication flow"));
    }

    #[test]
    fn test_gated_tool_gets_empty_object_schema() {
        let spec = ToolSpec::from_mcp(McpToolDef::new("create_post").with_description("   "));
        assert!(spec.requires_auth);
        assert_eq!(spec.input_schema, json!({"type": "object", "properties": {}, "required": []}));
        assert_eq!(spec.summary(), "This tool requires a verified wallet session (handled via auth_token)");
    }

    #[test]
    fn test_server_schema_is_kept() {
        let schema = json!({"type": "object", "properties": {"query": {"type": "string"}}});
        let spec = ToolSpec::from_mcp(
            McpToolDef::new("search_forum")
                .with_description("Search the forum. Returns posts.")
                .with_schema(schema.clone()),
        );
        assert_eq!(spec.input_schema, schema);
        assert_eq!(spec.summary(), "Search the forum");

        let def = spec.to_definition();
        assert_eq!(def.parameters, schema);
    }

    #[test]
    fn test_token_injected_for_gated_tools_only() {
        let args = json!({"post_id": 4});
        let injected = with_auth_token("add_reaction", args.clone(), Some("tok"));
        assert_eq!(injected, json!({"post_id": 4, "auth_token": "tok"}));

        let exempt = with_auth_token(VERIFY_TOOL, json!({"address": "0x1"}), Some("tok"));
        assert_eq!(exempt, json!({"address": "0x1"}));

        let no_token = with_auth_token("add_reaction", args.clone(), None);
        assert_eq!(no_token, args);
    }

    #[test]
    fn test_token_injection_coerces_non_object_arguments() {
        assert_eq!(
            with_auth_token("list_posts", Value::Null, Some("tok")),
            json!({"auth_token": "tok"})
        );
        assert_eq!(
            with_auth_token("list_posts", json!("oops"), Some("tok")),
            json!({"auth_token": "tok"})
        );
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 500), "short");
        assert_eq!(truncate_with_ellipsis("abcdef", 3), "abc...");
        assert_eq!(truncate_with_ellipsis("ééééé", 2), "éé...");
        let exact = "x".repeat(500);
        assert_eq!(truncate_with_ellipsis(&exact, 500), exact);
    }

    #[test]
    fn test_output_from_mcp_result() {
        let result = McpToolResult {
            content: vec![McpContent::Unknown],
            is_error: false,
        };
        assert_eq!(ToolOutput::from_mcp(&result, 500).content, NO_TEXT_RESULT);

        let long = McpToolResult::error("y".repeat(600));
        let output = ToolOutput::from_mcp(&long, 500);
        assert!(output.is_error);
        assert_eq!(output.content.chars().count(), 503);
    }

    #[test]
    fn test_failure_output() {
        let output = ToolOutput::failure(&anyhow::anyhow!("connection reset"));
        assert_eq!(output.content, "Tool error: connection reset");
        assert!(output.is_error);
    }
}
