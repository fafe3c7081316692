//! OpenAI LLM provider implementation
//!
//! SECURITY: API keys are ONLY sent to official OpenAI endpoints.
//! The OPENAI_API_KEY is never sent to any third-party services.

use super::{
    ContentPart, LlmError, LlmProvider, LlmResponse, Message, Role, StopReason, TokenUsage,
    ToolDefinition,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;

/// Official OpenAI API endpoint - API key is ONLY sent here
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo";

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: usize,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            max_tokens: 4096,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key =
            env::var("OPENAI_API_KEY").context("OPENAI_API_KEY environment variable not set")?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Map our turns onto Chat Completions messages.
    ///
    /// A tool-result turn becomes one `tool` message per result, each linked by
    /// `tool_call_id`. Error-flagged results carry no extra field on this API;
    /// their text already starts with "Tool error:".
    fn convert_messages(&self, system: &str, messages: &[Message]) -> Vec<OpenAiMessage> {
        let mut result = Vec::with_capacity(messages.len() + 1);

        if !system.trim().is_empty() {
            result.push(OpenAiMessage::text("system", system));
        }

        for msg in messages {
            match msg.role {
                Role::System => result.push(OpenAiMessage::text("system", msg.text())),
                Role::User => result.push(OpenAiMessage::text("user", msg.text())),
                Role::Assistant => {
                    let tool_calls: Vec<OpenAiToolCall> = msg
                        .content
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::ToolUse { id, name, input } => Some(OpenAiToolCall {
                                id: id.clone(),
                                call_type: "function".to_string(),
                                function: OpenAiFunctionCall {
                                    name: name.clone(),
                                    arguments: input.to_string(),
                                },
                            }),
                            _ => None,
                        })
                        .collect();

                    let text = msg.text();
                    result.push(OpenAiMessage {
                        role: "assistant".to_string(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        tool_call_id: None,
                    });
                }
                Role::Tool => {
                    for part in &msg.content {
                        if let ContentPart::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } = part
                        {
                            result.push(OpenAiMessage {
                                role: "tool".to_string(),
                                content: Some(content.clone()),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            });
                        }
                    }
                }
            }
        }

        result
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
        tools
            .iter()
            .map(|t| OpenAiTool {
                tool_type: "function".to_string(),
                function: OpenAiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn parse_response(response: OpenAiResponse) -> Result<LlmResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            content.push(ContentPart::Text { text });
        }

        for call in choice.message.tool_calls.unwrap_or_default() {
            let input = serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                tracing::warn!(
                    tool = %call.function.name,
                    error = %e,
                    "Tool arguments are not valid JSON, sending empty arguments"
                );
                serde_json::json!({})
            });
            content.push(ContentPart::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        let mut stop_reason = StopReason::from_openai(choice.finish_reason.as_deref());
        // Some compatible backends report "stop" while still returning tool calls
        if !stop_reason.is_tool_use()
            && content
                .iter()
                .any(|p| matches!(p, ContentPart::ToolUse { .. }))
        {
            stop_reason = StopReason::ToolUse;
        }

        let usage = response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(LlmResponse {
            content,
            stop_reason,
            usage,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: self.convert_messages(system, messages),
            max_tokens: Some(self.max_tokens),
            tools: if tools.is_empty() {
                None
            } else {
                Some(self.convert_tools(tools))
            },
            tool_choice: if tools.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
        };

        tracing::debug!(
            target: "llm",
            provider = "openai",
            model = %self.model,
            messages = request.messages.len(),
            tools = tools.len(),
            "Sending chat request"
        );

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, error_text).into());
        }

        let response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Self::parse_response(response)
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new("test-key")
    }

    #[test]
    fn test_tool_turn_expands_to_one_message_per_result() {
        let messages = vec![
            Message::user("search and react"),
            Message::assistant_parts(vec![
                ContentPart::ToolUse {
                    id: "call_1".to_string(),
                    name: "search_forum".to_string(),
                    input: json!({"query": "rust"}),
                },
                ContentPart::ToolUse {
                    id: "call_2".to_string(),
                    name: "add_reaction".to_string(),
                    input: json!({"post_id": 1}),
                },
            ]),
            Message::tool_results(vec![
                ContentPart::tool_result("call_1", "3 posts"),
                ContentPart::tool_error("call_2", "Tool error: denied"),
            ]),
        ];

        let converted = provider().convert_messages("be helpful", &messages);
        let roles: Vec<&str> = converted.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "tool"]);

        let assistant = &converted[2];
        assert!(assistant.content.is_none());
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"query":"rust"}"#);

        assert_eq!(converted[4].tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(converted[4].content.as_deref(), Some("Tool error: denied"));
    }

    #[test]
    fn test_parse_tool_call_response() {
        let raw = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "get_wallet_challenge", "arguments": "{\"address\":\"0xabc\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });

        let response: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let parsed = OpenAiProvider::parse_response(response).unwrap();

        assert!(parsed.stop_reason.is_tool_use());
        let calls = parsed.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["address"], "0xabc");
        assert_eq!(parsed.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_text_response() {
        let raw = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "All done."},
                "finish_reason": "stop"
            }]
        });

        let response: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let parsed = OpenAiProvider::parse_response(response).unwrap();
        assert_eq!(parsed.stop_reason, StopReason::EndTurn);
        assert_eq!(parsed.text(), "All done.");
    }

    #[test]
    fn test_parse_empty_choices_is_invalid() {
        let response: OpenAiResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        let err = OpenAiProvider::parse_response(response).unwrap_err();
        assert!(err.to_string().contains("No choices"));
    }
}
