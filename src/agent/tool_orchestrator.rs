//! Tool execution loop
//!
//! One user turn runs LLM → tools → LLM until the model answers in plain text
//! or the round cap is hit. Tool calls within a batch run strictly in order
//! and a failing call never aborts the batch.

use super::context::{ConversationContext, DEFAULT_MAX_MESSAGES};
use super::prompt;
use crate::config::AgentConfig;
use crate::llm::{ContentPart, LlmProvider, LlmResponse, Message, TokenUsage, ToolCall};
use crate::mcp::ToolBackend;
use crate::tools::{self, ToolCatalog, ToolOutput};
use crate::wallet::AuthSession;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

/// Appended to the window when a turn is stopped by the round cap
pub const ROUND_LIMIT_NOTICE: &str =
    "I've reached the maximum number of steps. Let me know if you'd like me to continue.";

/// Characters of a tool result kept in the call log
const PREVIEW_CHARS: usize = 200;

/// Configuration for the tool orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Tool rounds allowed per user turn
    pub max_tool_rounds: usize,
    /// Window cap applied before every LLM call
    pub max_history_turns: usize,
    /// Characters kept per tool result
    pub max_tool_result_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 25,
            max_history_turns: DEFAULT_MAX_MESSAGES,
            max_tool_result_chars: 500,
        }
    }
}

impl From<&AgentConfig> for OrchestratorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_tool_rounds: config.max_tool_rounds,
            max_history_turns: config.max_history_turns,
            max_tool_result_chars: config.max_tool_result_chars,
        }
    }
}

/// A single tool call log entry
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallLog {
    pub tool: String,
    /// Arguments as the model sent them, without the injected token
    pub args: serde_json::Value,
    pub result_preview: String,
    pub is_error: bool,
}

/// Outcome of one user turn
#[derive(Debug)]
pub struct AgentResponse {
    pub text: String,
    /// Tool rounds executed
    pub rounds: usize,
    pub tool_calls_made: usize,
    pub tool_call_log: Vec<ToolCallLog>,
    /// The turn was cut short by the round cap
    pub hit_round_limit: bool,
    pub usage: Option<TokenUsage>,
}

/// Drives the LLM/tool loop for a chat session
pub struct ToolOrchestrator {
    llm: Arc<dyn LlmProvider>,
    backend: Arc<dyn ToolBackend>,
    config: OrchestratorConfig,
}

impl ToolOrchestrator {
    pub fn new(llm: Arc<dyn LlmProvider>, backend: Arc<dyn ToolBackend>) -> Self {
        Self {
            llm,
            backend,
            config: OrchestratorConfig::default(),
        }
    }

    /// Set custom configuration
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Run one user turn to completion
    pub async fn run_turn(
        &self,
        context: &mut ConversationContext,
        auth: &AuthSession,
        user_message: &str,
    ) -> Result<AgentResponse> {
        self.run_turn_with(context, auth, user_message, |_| {}).await
    }

    /// Run one user turn, reporting each tool result as it completes
    ///
    /// LLM errors propagate. Rounds that already completed stay in the
    /// window; if the very first call fails the user turn is withdrawn.
    pub async fn run_turn_with<F>(
        &self,
        context: &mut ConversationContext,
        auth: &AuthSession,
        user_message: &str,
        on_tool_complete: F,
    ) -> Result<AgentResponse>
    where
        F: Fn(&ToolCallLog) + Send + Sync,
    {
        let catalog = ToolCatalog::from_mcp(
            self.backend
                .list_tools()
                .await
                .context("Failed to list tools")?,
        );
        tracing::debug!(tools = catalog.len(), "Tool catalog loaded");

        let definitions = catalog.definitions();
        let base_prompt = prompt::build_system_prompt(&catalog, auth);
        let follow_up_prompt = prompt::with_follow_up(&base_prompt);

        let user_turn = Message::user(user_message);
        context.push(user_turn.clone());

        let mut state = LoopState::new();

        loop {
            if context.prune_to(self.config.max_history_turns) {
                tracing::debug!(round = state.rounds, "Window pruned before LLM call");
            }

            let system = if state.rounds == 0 {
                &base_prompt
            } else {
                &follow_up_prompt
            };

            let response = match self.llm.chat(system, context.messages(), &definitions).await {
                Ok(response) => response,
                Err(e) => {
                    if state.rounds == 0 {
                        context.retract(&user_turn);
                    }
                    return Err(e);
                }
            };
            state.record_usage(&response);

            let tool_calls = response.tool_calls();
            if !response.stop_reason.is_tool_use() || tool_calls.is_empty() {
                if response.stop_reason.is_tool_use() {
                    tracing::warn!("Model stopped for tool use without requesting any tool");
                }
                // Unexecuted requests would leave call ids without results
                let mut message = response.to_message();
                let before = message.content.len();
                message
                    .content
                    .retain(|part| !matches!(part, ContentPart::ToolUse { .. }));
                if message.content.len() < before {
                    tracing::warn!(
                        dropped = before - message.content.len(),
                        stop_reason = ?response.stop_reason,
                        "Dropping tool requests from a final response"
                    );
                }
                if !message.content.is_empty() {
                    context.push(message);
                }
                return Ok(state.into_response(response.text(), false));
            }

            if state.rounds >= self.config.max_tool_rounds {
                tracing::warn!(
                    rounds = state.rounds,
                    pending = tool_calls.len(),
                    "Tool round cap reached; not executing further tools"
                );
                let partial = response.text();
                let text = if partial.trim().is_empty() {
                    ROUND_LIMIT_NOTICE.to_string()
                } else {
                    format!("{}\n\n{}", partial, ROUND_LIMIT_NOTICE)
                };
                context.push(Message::assistant(text.clone()));
                return Ok(state.into_response(text, true));
            }

            let results = self
                .execute_batch(&tool_calls, auth, &mut state, &on_tool_complete)
                .await;

            context.push(response.to_message());
            context.push(Message::tool_results(results));
            state.rounds += 1;
        }
    }

    /// Execute every call in order, one result per call
    async fn execute_batch<F>(
        &self,
        tool_calls: &[ToolCall],
        auth: &AuthSession,
        state: &mut LoopState,
        on_tool_complete: &F,
    ) -> Vec<ContentPart>
    where
        F: Fn(&ToolCallLog) + Send + Sync,
    {
        let mut results = Vec::with_capacity(tool_calls.len());

        for call in tool_calls {
            let output = self.execute_one(call, auth).await;

            let entry = ToolCallLog {
                tool: call.name.clone(),
                args: call.arguments.clone(),
                result_preview: tools::truncate_with_ellipsis(&output.content, PREVIEW_CHARS),
                is_error: output.is_error,
            };
            on_tool_complete(&entry);
            state.tool_log.push(entry);
            state.tool_calls_made += 1;

            results.push(if output.is_error {
                ContentPart::tool_error(&call.id, output.content)
            } else {
                ContentPart::tool_result(&call.id, output.content)
            });
        }

        results
    }

    async fn execute_one(&self, call: &ToolCall, auth: &AuthSession) -> ToolOutput {
        let arguments = tools::with_auth_token(&call.name, call.arguments.clone(), auth.token());

        tracing::info!(tool = %call.name, call_id = %call.id, "Calling tool");
        match self.backend.call_tool(&call.name, arguments).await {
            Ok(result) => {
                let output = ToolOutput::from_mcp(&result, self.config.max_tool_result_chars);
                if output.is_error {
                    tracing::warn!(tool = %call.name, "Tool reported an error");
                }
                output
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolOutput::failure(&e)
            }
        }
    }
}

/// Per-turn bookkeeping
struct LoopState {
    /// Completed tool rounds
    rounds: usize,
    /// Total tool calls made
    tool_calls_made: usize,
    tool_log: Vec<ToolCallLog>,
    /// Accumulated token usage
    usage: TokenUsage,
    saw_usage: bool,
}

impl LoopState {
    fn new() -> Self {
        Self {
            rounds: 0,
            tool_calls_made: 0,
            tool_log: Vec::new(),
            usage: TokenUsage::default(),
            saw_usage: false,
        }
    }

    fn record_usage(&mut self, response: &LlmResponse) {
        if let Some(usage) = &response.usage {
            self.usage.add(usage);
            self.saw_usage = true;
        }
    }

    fn into_response(self, text: String, hit_round_limit: bool) -> AgentResponse {
        AgentResponse {
            text,
            rounds: self.rounds,
            tool_calls_made: self.tool_calls_made,
            tool_call_log: self.tool_log,
            hit_round_limit,
            usage: self.saw_usage.then_some(self.usage),
        }
    }
}
