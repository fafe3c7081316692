//! System instructions sent with every LLM call

use crate::tools::ToolCatalog;
use crate::wallet::AuthSession;

/// Appended on every call after the first in a turn, once tool results are in
pub const FOLLOW_UP_INSTRUCTION: &str = "IMPORTANT: Complete all steps in multi-step tasks. \
    If you just executed a tool, check its result and take any necessary follow-up actions \
    before stopping.";

/// Build the system prompt for one user turn
pub fn build_system_prompt(catalog: &ToolCatalog, auth: &AuthSession) -> String {
    let status = if auth.is_verified() {
        "verified"
    } else {
        "not verified"
    };
    let address = auth.address().unwrap_or("unknown");

    let tools = if catalog.is_empty() {
        "- (no tools available)".to_string()
    } else {
        catalog
            .specs()
            .iter()
            .map(|spec| format!("- {}: {}", spec.name, spec.summary()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are an AI assistant for the moreright forum. User is {status}.

CRITICAL RULES:
1. ALWAYS use tool_use blocks for actions
2. For multi-step tasks, you MUST complete all steps:
   - If search then react, you must do both
   - Never stop after the first action
   - Chain tool calls in a single response
3. Never expose auth tokens
4. Be concise
5. When a user asks about "my profile", "my posts", "my wallet", or "my anything", use their authenticated wallet address ({address}) as their user ID

Tools:
{tools}

Example of chaining:
User: "Search for X and react to top post"
You must:
1. Call search_forum
2. Get result and immediately call add_reaction
3. Both tools in same response"#
    )
}

/// Prompt for a follow-up call within the same turn
pub fn with_follow_up(system: &str) -> String {
    format!("{}\n\n{}", system, FOLLOW_UP_INSTRUCTION)
}
