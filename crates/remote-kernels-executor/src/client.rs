//! Drives one code execution over the kernel message channel.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use remote_kernels_core::{ExecutionOutput, ExecutionState};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};
use url::Url;

use crate::wire::{ExecuteRequest, KernelMessage, MessageKind, ReplyStatus};

type Channel = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Execution protocol error.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// No terminal idle status arrived within the configured window.
    #[error("kernel did not finish within {0:?}")]
    Timeout(Duration),
    /// The channel closed before the kernel reported idle.
    #[error("kernel channel closed before execution finished")]
    ChannelClosed,
    /// WebSocket failure while talking to the kernel.
    #[error("kernel channel transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    /// The execute request could not be encoded.
    #[error("failed to encode execute request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result captured while draining the channel, ordered by priority:
/// error > execute_result > display_data > stream > empty.
#[derive(Debug, Default)]
enum Captured {
    #[default]
    Empty,
    Stream(String),
    Display(ExecutionOutput),
    Result(ExecutionOutput),
    Error { ename: String, evalue: String },
}

impl Captured {
    const fn rank(&self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Stream(_) => 1,
            Self::Display(_) => 2,
            Self::Result(_) => 3,
            Self::Error { .. } => 4,
        }
    }

    /// The first error wins; the loop keeps draining but never downgrades it.
    fn error(&mut self, ename: String, evalue: String) {
        if self.rank() < 4 {
            *self = Self::Error { ename, evalue };
        }
    }

    fn result(&mut self, output: ExecutionOutput) {
        if self.rank() <= 3 {
            *self = Self::Result(output);
        }
    }

    fn display(&mut self, output: ExecutionOutput) {
        if self.rank() <= 2 {
            *self = Self::Display(output);
        }
    }

    /// Lowest priority; a later chunk replaces an earlier one.
    fn stream(&mut self, text: String) {
        if self.rank() <= 1 {
            *self = Self::Stream(text);
        }
    }

    fn finish(self) -> ExecutionOutput {
        match self {
            Self::Empty => ExecutionOutput::Empty,
            Self::Stream(text) => ExecutionOutput::text(text),
            Self::Display(output) | Self::Result(output) => output,
            Self::Error { ename, evalue } => ExecutionOutput::Error { ename, evalue },
        }
    }
}

/// Client that runs single code executions against kernel channels.
///
/// Each call opens its own connection, so executions against different
/// kernels proceed in parallel. The protocol offers no multiplexing beyond
/// `msg_id` correlation and a kernel processes one request at a time, so
/// callers serialize executions per kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionClient;

impl ExecutionClient {
    /// Create a new execution client.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute `code` in the kernel behind `endpoint`.
    ///
    /// Opens the channel, sends one execute request and consumes replies
    /// until the kernel reports idle or `timeout` elapses. The connection is
    /// closed on every exit path, including cancellation of the returned
    /// future.
    ///
    /// # Errors
    /// Returns `Timeout` when no idle status arrives in time, `ChannelClosed`
    /// when the gateway drops the channel mid-execution and `Transport` for
    /// connection failures. Errors raised by the executed code are not
    /// errors of this call; they come back as `ExecutionOutput::Error`.
    pub async fn execute(
        &self,
        endpoint: &Url,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutput, ExecuteError> {
        let request = ExecuteRequest::of_code(code);
        let payload = serde_json::to_string(&request)?;
        debug!(url = %endpoint, msg_id = %request.msg_id(), "connecting to kernel channel");
        let (mut channel, _) = connect_async(endpoint.as_str()).await?;

        let result = match channel.send(Message::text(payload)).await {
            Ok(()) => {
                match tokio::time::timeout(timeout, collect(&mut channel, request.msg_id())).await {
                    Ok(collected) => collected,
                    Err(_) => Err(ExecuteError::Timeout(timeout)),
                }
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = channel.close(None).await {
            debug!("error closing kernel channel: {e}");
        }
        result
    }
}

/// Consume inbound messages until the kernel reports idle for this request.
async fn collect(channel: &mut Channel, msg_id: &str) -> Result<ExecutionOutput, ExecuteError> {
    let mut captured = Captured::default();
    while let Some(frame) = channel.next().await {
        let frame = frame?;
        if frame.is_close() {
            return Err(ExecuteError::ChannelClosed);
        }
        if !frame.is_text() && !frame.is_binary() {
            continue;
        }
        let Ok(text) = frame.to_text() else {
            warn!("discarding non-utf8 frame from kernel channel");
            continue;
        };
        trace!(frame = text, "kernel channel frame");

        let message = match KernelMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("discarding malformed kernel message: {e}");
                continue;
            }
        };
        if message.parent_msg_id.as_deref() != Some(msg_id) {
            // Stale traffic from a previous request on this kernel.
            debug!(parent = ?message.parent_msg_id, "ignoring message for another request");
            continue;
        }

        match message.kind {
            MessageKind::Status { execution_state } => {
                if execution_state == ExecutionState::Idle {
                    // The kernel has finished this request.
                    return Ok(captured.finish());
                }
            }
            MessageKind::Error { ename, evalue } => captured.error(ename, evalue),
            MessageKind::ExecuteReply(reply) => {
                if reply.status == ReplyStatus::Error {
                    captured.error(
                        reply.ename.unwrap_or_default(),
                        reply.evalue.unwrap_or_default(),
                    );
                }
            }
            MessageKind::ExecuteResult(bundle) => match bundle.payload() {
                Some(output) => captured.result(output),
                None => debug!("execute_result without a recognizable payload"),
            },
            MessageKind::DisplayData(bundle) => match bundle.payload() {
                Some(output) => captured.display(output),
                None => debug!("display_data without a recognizable payload"),
            },
            MessageKind::Stream { text, .. } => captured.stream(text),
            MessageKind::ExecuteInput { .. } => {}
            MessageKind::Unknown { msg_type } => debug!(%msg_type, "unhandled message type"),
        }
    }
    Err(ExecuteError::ChannelClosed)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn status(parent: &str, state: &str) -> Value {
        json!({
            "header": {"msg_id": "srv-status", "msg_type": "status"},
            "parent_header": {"msg_id": parent},
            "metadata": {},
            "content": {"execution_state": state},
            "buffers": [],
            "channel": "iopub",
        })
    }

    fn execute_result(parent: &str, text: &str) -> Value {
        json!({
            "header": {"msg_id": "srv-result", "msg_type": "execute_result"},
            "parent_header": {"msg_id": parent},
            "metadata": {},
            "content": {"data": {"text/plain": text}, "metadata": {}, "execution_count": 1},
            "buffers": [],
            "channel": "iopub",
        })
    }

    fn display_data(parent: &str, png: &str) -> Value {
        json!({
            "header": {"msg_id": "srv-display", "msg_type": "display_data"},
            "parent_header": {"msg_id": parent},
            "metadata": {},
            "content": {"data": {"image/png": png}, "metadata": {}},
            "buffers": [],
            "channel": "iopub",
        })
    }

    fn stream(parent: &str, text: &str) -> Value {
        json!({
            "header": {"msg_id": "srv-stream", "msg_type": "stream"},
            "parent_header": {"msg_id": parent},
            "metadata": {},
            "content": {"name": "stdout", "text": text},
            "buffers": [],
            "channel": "iopub",
        })
    }

    fn error(parent: &str, ename: &str, evalue: &str) -> Value {
        json!({
            "header": {"msg_id": "srv-error", "msg_type": "error"},
            "parent_header": {"msg_id": parent},
            "metadata": {},
            "content": {"ename": ename, "evalue": evalue, "traceback": []},
            "buffers": [],
            "channel": "iopub",
        })
    }

    /// Serve one scripted kernel-channel conversation: read the execute
    /// request, emit `script(msg_id)`, then keep the connection open until
    /// the client hangs up.
    async fn fake_kernel<F>(script: F) -> Url
    where
        F: FnOnce(&str) -> Vec<Value> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut channel = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let frame = channel.next().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
            let msg_id = request["header"]["msg_id"].as_str().unwrap().to_owned();
            for message in script(&msg_id) {
                channel.send(Message::text(message.to_string())).await.unwrap();
            }
            while let Some(Ok(frame)) = channel.next().await {
                if frame.is_close() {
                    break;
                }
            }
        });
        Url::parse(&format!("ws://{addr}")).unwrap()
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn returns_execute_result_text() {
        let endpoint = fake_kernel(|id| {
            vec![
                status(id, "busy"),
                execute_result(id, "2"),
                status(id, "idle"),
            ]
        })
        .await;
        let output = ExecutionClient::new()
            .execute(&endpoint, "1+1", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output, ExecutionOutput::text("2"));
    }

    #[tokio::test]
    async fn execute_result_outranks_stream() {
        let endpoint = fake_kernel(|id| {
            vec![
                stream(id, "working\n"),
                execute_result(id, "2"),
                status(id, "idle"),
            ]
        })
        .await;
        let output = ExecutionClient::new()
            .execute(&endpoint, "1+1", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output, ExecutionOutput::text("2"));
    }

    #[tokio::test]
    async fn error_outranks_everything_and_drains_to_idle() {
        let endpoint = fake_kernel(|id| {
            vec![
                stream(id, "partial output\n"),
                error(id, "NameError", "name 'b' is not defined"),
                stream(id, "trailing output\n"),
                status(id, "idle"),
            ]
        })
        .await;
        let output = ExecutionClient::new()
            .execute(&endpoint, "b", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output.to_string(), "NameError: name 'b' is not defined");
    }

    #[tokio::test]
    async fn display_data_surfaces_below_execute_result() {
        let endpoint = fake_kernel(|id| {
            vec![
                display_data(id, "aGVsbG8="),
                status(id, "idle"),
            ]
        })
        .await;
        let output = ExecutionClient::new()
            .execute(&endpoint, "plot()", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output, ExecutionOutput::image("aGVsbG8="));

        let endpoint = fake_kernel(|id| {
            vec![
                display_data(id, "aGVsbG8="),
                execute_result(id, "<Figure>"),
                status(id, "idle"),
            ]
        })
        .await;
        let output = ExecutionClient::new()
            .execute(&endpoint, "plot()", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output, ExecutionOutput::text("<Figure>"));
    }

    #[tokio::test]
    async fn unrelated_messages_never_affect_the_result() {
        let endpoint = fake_kernel(|id| {
            vec![
                execute_result("someone-elses-request", "99"),
                error("someone-elses-request", "ValueError", "nope"),
                status("someone-elses-request", "idle"),
                status(id, "idle"),
            ]
        })
        .await;
        let output = ExecutionClient::new()
            .execute(&endpoint, "pass", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output, ExecutionOutput::Empty);
    }

    #[tokio::test]
    async fn idle_without_output_is_empty() {
        let endpoint =
            fake_kernel(|id| vec![status(id, "busy"), status(id, "idle")]).await;
        let output = ExecutionClient::new()
            .execute(&endpoint, "a = 1", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output, ExecutionOutput::Empty);
    }

    #[tokio::test]
    async fn missing_idle_times_out() {
        let endpoint = fake_kernel(|id| vec![status(id, "busy")]).await;
        let result = ExecutionClient::new()
            .execute(&endpoint, "while True: pass", Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(ExecuteError::Timeout(_))));
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let endpoint = fake_kernel(|id| {
            vec![
                json!({"not": "a kernel message"}),
                execute_result(id, "2"),
                status(id, "idle"),
            ]
        })
        .await;
        let output = ExecutionClient::new()
            .execute(&endpoint, "1+1", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output, ExecutionOutput::text("2"));
    }
}
