//! Shared types for LLM providers

use serde::{Deserialize, Serialize};

/// Role in a conversation
///
/// `Tool` is the carrier role for tool results. Providers map it to whatever
/// their wire format expects (Anthropic: `user`, OpenAI: `tool`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message (turn) in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

/// Part of a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentPart::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn tool_error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentPart::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::text(content)],
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::text(content)],
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::text(content)],
        }
    }

    /// Assistant turn carrying arbitrary blocks (text and/or tool requests)
    pub fn assistant_parts(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Tool-result carrier turn
    pub fn tool_results(results: Vec<ContentPart>) -> Self {
        Self {
            role: Role::Tool,
            content: results,
        }
    }

    /// Text blocks joined with newlines
    pub fn text(&self) -> String {
        self.text_parts().collect::<Vec<_>>().join("\n")
    }

    /// First text block, if any
    pub fn first_text(&self) -> Option<&str> {
        self.text_parts().next()
    }

    fn text_parts(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Whether this turn requests at least one tool
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|p| matches!(p, ContentPart::ToolUse { .. }))
    }

    /// Call ids of tool requests in this turn
    pub fn tool_use_ids(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|p| match p {
            ContentPart::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    /// Call ids referenced by tool results in this turn
    pub fn tool_result_ids(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|p| match p {
            ContentPart::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        })
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The model wants one or more tools executed before it continues
    ToolUse,
    EndTurn,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    /// Parse an Anthropic `stop_reason` value
    pub fn from_anthropic(value: Option<&str>) -> Self {
        match value {
            Some("tool_use") => StopReason::ToolUse,
            Some("end_turn") | None => StopReason::EndTurn,
            Some("max_tokens") => StopReason::MaxTokens,
            Some("stop_sequence") => StopReason::StopSequence,
            Some(other) => StopReason::Other(other.to_string()),
        }
    }

    /// Parse an OpenAI `finish_reason` value
    pub fn from_openai(value: Option<&str>) -> Self {
        match value {
            Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
            Some("stop") | None => StopReason::EndTurn,
            Some("length") => StopReason::MaxTokens,
            Some(other) => StopReason::Other(other.to_string()),
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, StopReason::ToolUse)
    }
}

/// Response from an LLM
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Vec<ContentPart>,
    pub stop_reason: StopReason,
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// Concatenated text blocks (newline-joined)
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool requests in the order the model emitted them
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// The assistant turn this response represents
    pub fn to_message(&self) -> Message {
        Message::assistant_parts(self.content.clone())
    }
}

/// A tool call from the LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Definition of a tool for the LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_text_joins_text_blocks() {
        let response = LlmResponse {
            content: vec![
                ContentPart::text("Found 3 posts."),
                ContentPart::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "search_forum".to_string(),
                    input: json!({"query": "rust"}),
                },
                ContentPart::text("Reacting now."),
            ],
            stop_reason: StopReason::ToolUse,
            usage: None,
        };

        assert_eq!(response.text(), "Found 3 posts.\nReacting now.");
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search_forum");
        assert_eq!(calls[0].arguments["query"], "rust");
    }

    #[test]
    fn test_stop_reason_parsing() {
        assert!(StopReason::from_anthropic(Some("tool_use")).is_tool_use());
        assert_eq!(StopReason::from_anthropic(None), StopReason::EndTurn);
        assert_eq!(
            StopReason::from_anthropic(Some("refusal")),
            StopReason::Other("refusal".to_string())
        );
        assert!(StopReason::from_openai(Some("tool_calls")).is_tool_use());
        assert_eq!(StopReason::from_openai(Some("length")), StopReason::MaxTokens);
    }

    #[test]
    fn test_tool_result_serialization_omits_false_error_flag() {
        let ok = serde_json::to_value(ContentPart::tool_result("toolu_1", "done")).unwrap();
        assert_eq!(
            ok,
            json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "done"})
        );

        let err = serde_json::to_value(ContentPart::tool_error("toolu_2", "boom")).unwrap();
        assert_eq!(err["is_error"], true);
    }

    #[test]
    fn test_message_id_helpers() {
        let msg = Message::assistant_parts(vec![
            ContentPart::ToolUse {
                id: "a".to_string(),
                name: "x".to_string(),
                input: json!({}),
            },
            ContentPart::ToolUse {
                id: "b".to_string(),
                name: "y".to_string(),
                input: json!({}),
            },
        ]);
        assert!(msg.has_tool_use());
        assert_eq!(msg.tool_use_ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(msg.first_text().is_none());

        let results = Message::tool_results(vec![ContentPart::tool_result("a", "ok")]);
        assert_eq!(results.tool_result_ids().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_token_usage_add() {
        let mut usage = TokenUsage::default();
        usage.add(&TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
            total_tokens: 150,
        });
        usage.add(&TokenUsage {
            input_tokens: 200,
            output_tokens: 75,
            total_tokens: 275,
        });
        assert_eq!(usage.total_tokens, 425);
    }
}
