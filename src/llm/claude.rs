//! Claude (Anthropic) LLM provider implementation
//!
//! SECURITY: API keys are ONLY sent to official Anthropic endpoints.
//! The ANTHROPIC_API_KEY is never sent to the forum tool server.

use super::{
    ContentPart, LlmError, LlmProvider, LlmResponse, Message, Role, StopReason, TokenUsage,
    ToolDefinition,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;

/// Official Anthropic API endpoint - API key is ONLY sent here
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Placeholder opening turn when pruning left an assistant turn first
const CONTINUATION_PLACEHOLDER: &str = "(continuing our conversation)";

pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: usize,
}

impl ClaudeProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_CLAUDE_MODEL.to_string(),
            max_tokens: 4096,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;
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

    /// Split the conversation into the `system` field and alternating messages.
    ///
    /// System-role turns (the pruning summary) cannot appear inside `messages`,
    /// so their text is appended to the system instructions.
    fn convert_messages(
        &self,
        system: &str,
        messages: &[Message],
    ) -> (Option<String>, Vec<ClaudeMessage>) {
        let mut system_sections: Vec<String> = Vec::new();
        if !system.trim().is_empty() {
            system_sections.push(system.to_string());
        }

        let mut claude_messages: Vec<ClaudeMessage> = Vec::new();

        for msg in messages {
            let role = match msg.role {
                Role::System => {
                    let text = msg.text();
                    if !text.trim().is_empty() {
                        system_sections.push(text);
                    }
                    continue;
                }
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
            };

            let blocks: Vec<ClaudeContentBlock> = msg
                .content
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } if text.trim().is_empty() => None,
                    ContentPart::Text { text } => Some(ClaudeContentBlock::Text { text: text.clone() }),
                    ContentPart::ToolUse { id, name, input } => Some(ClaudeContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    }),
                    ContentPart::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => Some(ClaudeContentBlock::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: content.clone(),
                        is_error: *is_error,
                    }),
                })
                .collect();

            if blocks.is_empty() {
                continue;
            }

            // Roles must alternate; fold consecutive same-role turns together
            match claude_messages.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => claude_messages.push(ClaudeMessage {
                    role: role.to_string(),
                    content: blocks,
                }),
            }
        }

        if claude_messages
            .first()
            .is_some_and(|first| first.role == "assistant")
        {
            claude_messages.insert(
                0,
                ClaudeMessage {
                    role: "user".to_string(),
                    content: vec![ClaudeContentBlock::Text {
                        text: CONTINUATION_PLACEHOLDER.to_string(),
                    }],
                },
            );
        }

        let system_prompt = if system_sections.is_empty() {
            None
        } else {
            Some(system_sections.join("\n\n"))
        };

        (system_prompt, claude_messages)
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<ClaudeTool> {
        tools
            .iter()
            .map(|t| ClaudeTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn parse_response(response: ClaudeResponse) -> LlmResponse {
        let content = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ClaudeContentBlock::Text { text } => Some(ContentPart::Text { text }),
                ClaudeContentBlock::ToolUse { id, name, input } => {
                    Some(ContentPart::ToolUse { id, name, input })
                }
                _ => None,
            })
            .collect();

        let usage = response.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        LlmResponse {
            content,
            stop_reason: StopReason::from_anthropic(response.stop_reason.as_deref()),
            usage,
        }
    }

    async fn send_request(&self, request: &ClaudeRequest) -> Result<ClaudeResponse> {
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, error_text).into());
        }

        response
            .json::<ClaudeResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()).into())
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
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
        let (system, messages) = self.convert_messages(system, messages);

        let request = ClaudeRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system,
            messages,
            tools: if tools.is_empty() {
                None
            } else {
                Some(self.convert_tools(tools))
            },
        };

        tracing::debug!(
            target: "llm",
            provider = "claude",
            model = %self.model,
            messages = request.messages.len(),
            tools = tools.len(),
            "Sending chat request"
        );

        let response = self.send_request(&request).await?;
        Ok(Self::parse_response(response))
    }
}

// Claude API request/response types

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ClaudeTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClaudeMessage {
    role: String,
    content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ClaudeContentBlock {
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
    /// Block types this client does not use (thinking, server tools, ...)
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Serialize)]
struct ClaudeTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContentBlock>,
    stop_reason: Option<String>,
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: u32,
    output_tokens: u32,
}
