//! MCP transport implementations.
//!
//! Supports:
//! - STDIO: Spawn a child process and communicate via stdin/stdout (async)
//! - SSE: see [`super::sse::SseTransport`]

use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// A JSON-RPC channel to one MCP server
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for its result
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;

    /// Send a notification (no response expected)
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;
}

/// STDIO transport for MCP servers (async)
pub struct StdioTransport {
    /// Child process, killed on drop
    _child: Child,
    /// Request ID counter
    next_id: AtomicU64,
    /// Stdin writer
    stdin: Mutex<ChildStdin>,
    /// Stdout reader
    stdout: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawn a new MCP server process (async)
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Set environment variables (expand ${VAR} references)
        for (key, value) in env {
            cmd.env(key, expand_env_vars(value));
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn MCP server: {}", command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to get stdout"))?;

        tracing::info!(command, "Spawned stdio MCP server");

        Ok(Self {
            _child: child,
            next_id: AtomicU64::new(1),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
        })
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request_str = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        tracing::debug!("MCP request: {}", request_str);

        // Hold the reader across write+read so responses cannot interleave
        let mut stdout = self.stdout.lock().await;
        self.write_line(&request_str).await?;

        loop {
            let mut line = String::new();
            let read = stdout.read_line(&mut line).await?;
            if read == 0 {
                anyhow::bail!("MCP server closed its output");
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tracing::debug!("MCP response: {}", line);

            let response: JsonRpcResponse = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!("Skipping non-response line from MCP server: {}", e);
                    continue;
                }
            };
            // Server-initiated notifications carry no id
            if response.id != Some(id) {
                continue;
            }
            return response.into_result();
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification_str = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        tracing::debug!("MCP notification: {}", notification_str);
        self.write_line(&notification_str).await
    }
}

/// Expand environment variable references like ${VAR} in a string
///
/// Unset variables are left as-is.
pub(crate) fn expand_env_vars(input: &str) -> String {
    static RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    let Some(re) = RE
        .get_or_init(|| regex::Regex::new(r"\$\{([^}]+)\}").ok())
        .as_ref()
    else {
        return input.to_string();
    };

    re.replace_all(input, |cap: &regex::Captures| {
        std::env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("MORERIGHT_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${MORERIGHT_TEST_VAR} world"), "hello world");
        assert_eq!(expand_env_vars("no vars here"), "no vars here");
        assert_eq!(
            expand_env_vars("${MORERIGHT_NONEXISTENT}"),
            "${MORERIGHT_NONEXISTENT}"
        );
    }
}
