//! MCP client session over any transport (async).

use super::transport::McpTransport;
use super::types::{
    InitializeResult, ListToolsResult, McpToolDef, McpToolResult, ServerInfo, PROTOCOL_VERSION,
};
use super::ToolBackend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Upper bound on `tools/list` pages, guards against a cursor that never ends
const MAX_LIST_PAGES: usize = 50;

/// An initialized MCP session
pub struct McpClient {
    transport: Box<dyn McpTransport>,
    server_info: ServerInfo,
}

impl McpClient {
    /// Run the `initialize` handshake over an open transport
    pub async fn connect(transport: Box<dyn McpTransport>) -> Result<Self> {
        let result = transport
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "moreright-assistant",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            )
            .await
            .context("MCP initialize failed")?;

        let init: InitializeResult = serde_json::from_value(result).unwrap_or_default();

        if let Err(e) = transport.notify("notifications/initialized", None).await {
            tracing::warn!("Failed to send initialized notification: {}", e);
        }

        if init.capabilities.tools.is_none() {
            tracing::warn!("MCP server did not advertise tool support");
        }

        tracing::info!(
            server = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "MCP session initialized"
        );

        Ok(Self {
            transport,
            server_info: init.server_info,
        })
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

#[async_trait]
impl ToolBackend for McpClient {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self
                .transport
                .request("tools/list", params)
                .await
                .context("Failed to list MCP tools")?;
            let page: ListToolsResult =
                serde_json::from_value(result).context("Failed to parse tools/list result")?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!("tools/list still paginating after {} pages", MAX_LIST_PAGES);
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult> {
        let result = self
            .transport
            .request(
                "tools/call",
                Some(json!({
                    "name": name,
                    "arguments": arguments
                })),
            )
            .await
            .with_context(|| format!("Failed to call tool: {}", name))?;

        serde_json::from_value(result).context("Failed to parse tool result")
    }
}
