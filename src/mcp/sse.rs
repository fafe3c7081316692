//! Server-Sent-Events transport for remote MCP servers.
//!
//! The server keeps one GET event stream open. Its first `endpoint` event names
//! the URL that requests are POSTed to; responses come back on the stream as
//! `message` events and are matched to callers by JSON-RPC id.

use super::transport::McpTransport;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use url::Url;

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name (`message` when the server omits `event:`)
    pub event: String,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Incremental Server-Sent Events decoder
///
/// Handles:
/// - Events split across multiple chunks
/// - Multiple events in a single chunk
/// - Multi-line `data:` fields and named `event:` fields
/// - Comment lines (`:` prefix)
///
/// # Example
///
/// ```
/// use moreright_assistant::mcp::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// let events = decoder.push(b"event: endpoint\ndata: /messages?session_id=1\n\n");
/// assert_eq!(events[0].event, "endpoint");
/// assert_eq!(events[0].data, "/messages?session_id=1");
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create a new SSE decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Push incoming bytes and extract every event completed by a blank line
    ///
    /// Incomplete events remain buffered for the next `push()` or `finish()`.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        // Append to buffer (lossy UTF-8 conversion for robustness)
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();

        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos]
                .trim_end_matches('\r')
                .to_string();
            self.buffer.drain(..=newline_pos);

            if line.is_empty() {
                events.extend(self.dispatch());
            } else {
                self.process_line(&line);
            }
        }

        events
    }

    /// Flush any remaining buffered content
    ///
    /// Call this when the stream ends to extract a final event that was not
    /// terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        for line in rest.lines() {
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.process_line(line);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// In-flight requests awaiting a response on the event stream
#[derive(Default)]
struct Pending {
    senders: HashMap<u64, oneshot::Sender<JsonRpcResponse>>,
    /// Set once the reader has stopped; nothing will be routed after this
    closed: bool,
}

type PendingMap = Arc<Mutex<Pending>>;

/// Register a waiter for `id`, failing fast once the stream is gone
async fn register(pending: &PendingMap, id: u64) -> Result<oneshot::Receiver<JsonRpcResponse>> {
    let mut pending = pending.lock().await;
    if pending.closed {
        anyhow::bail!("MCP event stream is closed; restart the session to reconnect");
    }
    let (tx, rx) = oneshot::channel();
    pending.senders.insert(id, tx);
    Ok(rx)
}

/// SSE transport for remote MCP servers
pub struct SseTransport {
    client: reqwest::Client,
    endpoint: Url,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its POST endpoint
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self> {
        let base = Url::parse(url).with_context(|| format!("Invalid MCP server URL: {}", url))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let response = client
            .get(base.clone())
            .header("Accept", "text/event-stream")
            .send()
            .await
            .with_context(|| format!("Failed to connect to MCP server at {}", base))?;

        if !response.status().is_success() {
            anyhow::bail!("MCP server returned HTTP {} for {}", response.status(), base);
        }

        let pending: PendingMap = Arc::new(Mutex::new(Pending::default()));
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<Url>();
        let reader = tokio::spawn(read_events(
            response.bytes_stream(),
            base.clone(),
            endpoint_tx,
            pending.clone(),
        ));

        let endpoint = match tokio::time::timeout(request_timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                anyhow::bail!("MCP event stream closed before announcing an endpoint")
            }
            Err(_) => {
                reader.abort();
                anyhow::bail!(
                    "Timed out after {:?} waiting for MCP endpoint from {}",
                    request_timeout,
                    base
                )
            }
        };

        tracing::info!(%endpoint, "Connected to MCP server over SSE");

        Ok(Self {
            client,
            endpoint,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader,
        })
    }

    async fn post(&self, body: String) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to send MCP message")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("MCP server rejected message: HTTP {} {}", status, text);
        }
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        tracing::debug!("MCP request: {}", body);

        let rx = register(&self.pending, id).await?;

        if let Err(e) = self.post(body).await {
            self.pending.lock().await.senders.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => anyhow::bail!("MCP event stream closed while waiting for {}", method),
            Err(_) => {
                self.pending.lock().await.senders.remove(&id);
                anyhow::bail!("MCP {} timed out after {:?}", method, self.request_timeout)
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let body = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        tracing::debug!("MCP notification: {}", body);
        self.post(body).await
    }
}

/// Background reader: resolves the endpoint, then routes responses by id
async fn read_events<S, B>(
    stream: S,
    base: Url,
    endpoint_tx: oneshot::Sender<Url>,
    pending: PendingMap,
) where
    S: futures::Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let mut stream = Box::pin(stream);
    let mut decoder = SseDecoder::new();
    let mut endpoint_tx = Some(endpoint_tx);

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("MCP event stream error: {}", e);
                break;
            }
        };

        for event in decoder.push(chunk.as_ref()) {
            handle_event(event, &base, &mut endpoint_tx, &pending).await;
        }
    }

    if let Some(event) = decoder.finish() {
        handle_event(event, &base, &mut endpoint_tx, &pending).await;
    }

    tracing::warn!("MCP event stream ended");
    // Dropping the senders wakes every waiting request with an error
    let mut pending = pending.lock().await;
    pending.closed = true;
    pending.senders.clear();
}

async fn handle_event(
    event: SseEvent,
    base: &Url,
    endpoint_tx: &mut Option<oneshot::Sender<Url>>,
    pending: &PendingMap,
) {
    match event.event.as_str() {
        "endpoint" => match base.join(event.data.trim()) {
            Ok(endpoint) => {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(endpoint);
                }
            }
            Err(e) => tracing::warn!("Invalid MCP endpoint '{}': {}", event.data, e),
        },
        "message" => {
            tracing::debug!("MCP response: {}", event.data);
            let response: JsonRpcResponse = match serde_json::from_str(&event.data) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!("Ignoring unparseable MCP message: {}", e);
                    return;
                }
            };
            let Some(id) = response.id else {
                return;
            };
            match pending.lock().await.senders.remove(&id) {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => tracing::debug!(id, "MCP response for unknown request id"),
            }
        }
        other => tracing::debug!(event = other, "Ignoring MCP event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_event_with_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: endpoint\ndata: /messages/?session_id=abc\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "endpoint".to_string(),
                data: "/messages/?session_id=abc".to_string(),
            }]
        );
    }

    #[test]
    fn test_unnamed_event_defaults_to_message() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"id\":1}\n\n");
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: message\ndata: {\"jsonrpc\":").is_empty());
        let events = decoder.push(b"\"2.0\",\"id\":2}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"jsonrpc\":\"2.0\",\"id\":2}");
    }

    #[test]
    fn test_multi_line_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": ping\ndata: first\ndata: second\n\nevent: message\ndata: x\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "first\nsecond");
        assert_eq!(events[1].data, "x");
    }

    #[test]
    fn test_comment_only_block_dispatches_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b": keepalive\n\n").is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: message\ndata: tail").is_empty());
        let last = decoder.finish().unwrap();
        assert_eq!(last.data, "tail");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_endpoint_resolves_against_stream_url() {
        let base = Url::parse("https://mcp.moreright.xyz/sse").unwrap();
        let endpoint = base.join("/messages/?session_id=abc").unwrap();
        assert_eq!(
            endpoint.as_str(),
            "https://mcp.moreright.xyz/messages/?session_id=abc"
        );
    }

    #[tokio::test]
    async fn test_message_event_routes_to_pending_request() {
        let pending: PendingMap = Arc::new(Mutex::new(Pending::default()));
        let rx = register(&pending, 7).await.unwrap();

        let base = Url::parse("https://example.com/sse").unwrap();
        let mut endpoint_tx = None;
        let event = SseEvent {
            event: "message".to_string(),
            data: r#"{"jsonrpc":"2.0","id":7,"result":{"tools":[]}}"#.to_string(),
        };
        handle_event(event, &base, &mut endpoint_tx, &pending).await;

        let response = rx.await.unwrap();
        assert_eq!(response.into_result().unwrap()["tools"], serde_json::json!([]));
        assert!(pending.lock().await.senders.is_empty());
    }

    #[tokio::test]
    async fn test_requests_fail_fast_after_stream_ends() {
        let pending: PendingMap = Arc::new(Mutex::new(Pending::default()));
        let waiting = register(&pending, 1).await.unwrap();

        let (endpoint_tx, _endpoint_rx) = oneshot::channel();
        let chunks: Vec<reqwest::Result<Vec<u8>>> =
            vec![Ok(b"event: endpoint\ndata: /messages\n\n".to_vec())];
        read_events(
            futures::stream::iter(chunks),
            Url::parse("https://example.com/sse").unwrap(),
            endpoint_tx,
            pending.clone(),
        )
        .await;

        // The waiter registered before the end is woken with an error
        assert!(waiting.await.is_err());

        let err = register(&pending, 2).await.unwrap_err();
        assert!(err.to_string().contains("event stream is closed"));
        assert!(pending.lock().await.senders.is_empty());
    }
}
