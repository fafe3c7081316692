//! MCP (Model Context Protocol) client implementation.
//!
//! Connects the assistant to the forum's tool server, either over SSE (the
//! hosted server) or by spawning a local server process.

pub mod client;
pub mod sse;
pub mod transport;
pub mod types;

// Re-export main types
pub use client::McpClient;
pub use sse::{SseDecoder, SseEvent, SseTransport};
pub use transport::{McpTransport, StdioTransport};
pub use types::{McpContent, McpToolDef, McpToolResult};

use crate::config::McpConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Remote tool invocation surface used by the agent and the authenticator
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Current tool catalog
    async fn list_tools(&self) -> Result<Vec<McpToolDef>>;

    /// Invoke one tool; `Err` means the call never produced a result
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult>;
}

/// Open the configured transport and run the MCP handshake
///
/// A configured `command` selects a local stdio server; otherwise the SSE
/// server at `server_url` is used.
pub async fn connect(config: &McpConfig) -> Result<McpClient> {
    let transport: Box<dyn McpTransport> = match &config.command {
        Some(command) => {
            Box::new(StdioTransport::spawn(command, &config.args, &config.env).await?)
        }
        None => Box::new(
            SseTransport::connect(
                &config.server_url,
                Duration::from_secs(config.request_timeout_secs),
            )
            .await?,
        ),
    };

    McpClient::connect(transport).await
}
