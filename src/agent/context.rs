//! Conversation context management
//!
//! The window is bounded by turn count. When it grows past the cap, older
//! turns collapse into one system-role summary turn. The summary is lossy and
//! there is no way back to the original turns.

use crate::core::ContextError;
use crate::llm::{ContentPart, Message, Role};

/// First line of every synthesized summary turn
pub const SUMMARY_HEADER: &str = "Previous conversation summary:\n";

/// Summary lines kept after collapsing older turns
const SUMMARY_MAX_LINES: usize = 5;

/// Characters of an assistant reply quoted in its summary line
const SUMMARY_PREVIEW_CHARS: usize = 100;

/// Default window cap in turns
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Manages conversation history and context
#[derive(Debug, Clone)]
pub struct ConversationContext {
    messages: Vec<Message>,
    max_messages: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationContext {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Append a turn, enforcing call-id linkage for tool results
    ///
    /// Every tool-result block must answer a tool request made by the
    /// immediately preceding assistant turn.
    pub fn append(&mut self, message: Message) -> Result<(), ContextError> {
        if let Some(call_id) = self.first_orphan_result(&message) {
            return Err(ContextError::ProtocolViolation {
                call_id: call_id.to_string(),
            });
        }
        self.messages.push(message);
        Ok(())
    }

    /// Append a turn, dropping tool results that reference unknown calls
    ///
    /// The rest of the turn is kept; a turn left empty is discarded.
    pub fn push(&mut self, message: Message) {
        let message = match self.append(message.clone()) {
            Ok(()) => return,
            Err(e) => {
                tracing::warn!("{}; dropping orphaned tool results", e);
                message
            }
        };

        let known = self.preceding_call_ids();
        let content: Vec<ContentPart> = message
            .content
            .into_iter()
            .filter(|part| match part {
                ContentPart::ToolResult { tool_use_id, .. } => {
                    let keep = known.contains(&tool_use_id.as_str());
                    if !keep {
                        tracing::debug!(call_id = %tool_use_id, "Dropped orphaned tool result");
                    }
                    keep
                }
                _ => true,
            })
            .collect();

        if !content.is_empty() {
            self.messages.push(Message {
                role: message.role,
                content,
            });
        }
    }

    /// Add a user message
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Add an assistant text message
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Apply the pruning policy in place; returns whether anything changed
    pub fn prune(&mut self) -> bool {
        self.prune_to(self.max_messages)
    }

    /// Prune against an explicit cap
    pub fn prune_to(&mut self, max_recent: usize) -> bool {
        if self.messages.len() <= max_recent {
            return false;
        }
        let before = self.messages.len();
        self.messages = prune_messages(&self.messages, max_recent);
        tracing::debug!(
            before,
            after = self.messages.len(),
            cap = max_recent,
            "Pruned conversation window"
        );
        true
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Clear all messages
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Remove the newest turn if it equals `expected`
    ///
    /// Used to withdraw a user turn whose first LLM call never succeeded.
    pub fn retract(&mut self, expected: &Message) -> bool {
        if self.messages.last() == Some(expected) {
            self.messages.pop();
            true
        } else {
            false
        }
    }

    fn preceding_call_ids(&self) -> Vec<&str> {
        match self.messages.last() {
            Some(last) if last.role == Role::Assistant => last.tool_use_ids().collect(),
            _ => Vec::new(),
        }
    }

    fn first_orphan_result<'m>(&self, message: &'m Message) -> Option<&'m str> {
        let known = self.preceding_call_ids();
        message
            .tool_result_ids()
            .find(|id| !known.contains(id))
    }
}

/// Bounded-window pruning
///
/// At or below `max_recent` turns the window is returned unchanged. Above it,
/// the newest `max_recent` turns are kept verbatim and everything older is
/// replaced by one summary turn placed first. The recent segment never begins
/// with a tool-result turn: the boundary moves later instead, so a request and
/// its results always stay on the same side. If no later boundary exists, it
/// moves back to the newest request so the recent segment is never empty. For
/// caps of 2 or more the result has at most `max_recent + 1` turns.
pub fn prune_messages(messages: &[Message], max_recent: usize) -> Vec<Message> {
    if messages.len() <= max_recent {
        return messages.to_vec();
    }

    let start = messages.len() - max_recent;
    let mut split = start;
    while split < messages.len() && messages[split].role == Role::Tool {
        split += 1;
    }
    if split == messages.len() {
        split = messages[..start]
            .iter()
            .rposition(|m| m.role != Role::Tool)
            .unwrap_or(0);
    }

    let (older, recent) = messages.split_at(split);

    let mut pruned = Vec::with_capacity(recent.len() + 1);
    if let Some(summary) = summarize(older) {
        pruned.push(summary);
    }
    pruned.extend_from_slice(recent);
    pruned
}

/// Collapse turns into a summary turn, or `None` if nothing is worth keeping
fn summarize(older: &[Message]) -> Option<Message> {
    let mut lines: Vec<String> = Vec::new();

    for message in older {
        match message.role {
            Role::System => {
                // An earlier summary carries its lines forward
                let text = message.text();
                let body = text.strip_prefix(SUMMARY_HEADER).unwrap_or(&text);
                lines.extend(
                    body.lines()
                        .filter(|line| !line.trim().is_empty())
                        .map(str::to_string),
                );
            }
            Role::User => {
                for part in &message.content {
                    if let ContentPart::Text { text } = part {
                        lines.push(format!("User asked: {}", text));
                    }
                }
            }
            Role::Assistant => {
                if message.has_tool_use() {
                    lines.push("Assistant used tools to fulfill request".to_string());
                } else if let Some(text) = message.first_text() {
                    let preview: String = text.chars().take(SUMMARY_PREVIEW_CHARS).collect();
                    lines.push(format!("Assistant responded: {}...", preview));
                }
            }
            Role::Tool => {}
        }
    }

    if lines.is_empty() {
        return None;
    }

    let start = lines.len().saturating_sub(SUMMARY_MAX_LINES);
    Some(Message::system(format!(
        "{}{}",
        SUMMARY_HEADER,
        lines[start..].join("\n")
    )))
}
