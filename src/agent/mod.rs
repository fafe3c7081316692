//! Chat agent with tool execution

mod context;
pub mod prompt;
mod tool_orchestrator;

pub use context::{prune_messages, ConversationContext, DEFAULT_MAX_MESSAGES, SUMMARY_HEADER};
pub use tool_orchestrator::{
    AgentResponse, OrchestratorConfig, ToolCallLog, ToolOrchestrator, ROUND_LIMIT_NOTICE,
};
