//! Wire types for the kernel message channel.
//!
//! Outbound execute requests and the inbound message kinds, decoded from the
//! `msg_type` discriminator in the envelope header.

use remote_kernels_core::{ExecutionOutput, ExecutionState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

fn uuid4_hex() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Header of an outbound execute request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestHeader {
    pub msg_id: String,
    pub msg_type: String,
}

/// Content of an execute request.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteContent {
    pub code: String,
    pub silent: bool,
    pub store_history: bool,
    pub user_expressions: Map<String, Value>,
    pub allow_stdin: bool,
}

/// One-shot execute request, correlated to its replies by `msg_id`.
///
/// The kernel disconnects when `parent_header` or `metadata` are missing, so
/// both are always serialized even though they carry nothing.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    pub header: RequestHeader,
    pub parent_header: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub content: ExecuteContent,
    pub channel: String,
}

impl ExecuteRequest {
    /// Build a request for `code` with a fresh message id.
    #[must_use]
    pub fn of_code(code: impl Into<String>) -> Self {
        Self {
            header: RequestHeader {
                msg_id: uuid4_hex(),
                msg_type: "execute_request".to_owned(),
            },
            parent_header: Map::new(),
            metadata: Map::new(),
            content: ExecuteContent {
                code: code.into(),
                silent: false,
                store_history: false,
                user_expressions: Map::new(),
                allow_stdin: false,
            },
            channel: "shell".to_owned(),
        }
    }

    /// Correlation id of this request.
    #[must_use]
    pub fn msg_id(&self) -> &str {
        &self.header.msg_id
    }
}

#[derive(Debug, Clone, Deserialize)]
struct InboundHeader {
    msg_id: String,
    msg_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ParentHeader {
    #[serde(default)]
    msg_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    header: InboundHeader,
    #[serde(default)]
    parent_header: ParentHeader,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    channel: Option<String>,
}

/// Status field of an execute reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
    Aborted,
    #[serde(other)]
    Unknown,
}

/// Reply content closing a request on the shell channel.
///
/// The error fields duplicate what the iopub `error` message carries; they
/// are only present when `status` is `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub ename: Option<String>,
    #[serde(default)]
    pub evalue: Option<String>,
}

/// Mime-keyed output bundle (`text/plain`, `image/png`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct MimeBundle {
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl MimeBundle {
    /// Pick the result payload out of the bundle.
    ///
    /// `image/png` wins over `text/plain`; bundles carrying neither yield
    /// nothing.
    #[must_use]
    pub fn payload(&self) -> Option<ExecutionOutput> {
        if let Some(data) = self.data.get("image/png").and_then(Value::as_str) {
            return Some(ExecutionOutput::image(data));
        }
        self.data
            .get("text/plain")
            .and_then(Value::as_str)
            .map(ExecutionOutput::text)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StatusContent {
    execution_state: ExecutionState,
}

#[derive(Debug, Clone, Deserialize)]
struct InputContent {
    code: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamContent {
    name: String,
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorContent {
    ename: String,
    evalue: String,
}

/// Closed set of message kinds on the kernel channel.
#[derive(Debug, Clone)]
pub enum MessageKind {
    /// Kernel execution-state transition.
    Status { execution_state: ExecutionState },
    /// Broadcast echo of the submitted code.
    ExecuteInput { code: String },
    /// Reply on the shell channel closing the request.
    ExecuteReply(ExecuteReply),
    /// Final value of the executed expression.
    ExecuteResult(MimeBundle),
    /// Rich output displayed during execution.
    DisplayData(MimeBundle),
    /// Stdout/stderr chunk.
    Stream { name: String, text: String },
    /// Error raised by the executed code.
    Error { ename: String, evalue: String },
    /// Message type this client does not handle.
    Unknown { msg_type: String },
}

/// One decoded inbound message from the kernel channel.
#[derive(Debug, Clone)]
pub struct KernelMessage {
    /// Id of this message.
    pub msg_id: String,
    /// Id of the request this message replies to, if any.
    pub parent_msg_id: Option<String>,
    /// Channel the message arrived on (`shell` or `iopub`).
    pub channel: Option<String>,
    /// Decoded payload.
    pub kind: MessageKind,
}

impl KernelMessage {
    /// Decode one frame from the channel.
    ///
    /// # Errors
    /// Returns an error when the envelope, or the content of a recognized
    /// message kind, cannot be parsed.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawMessage = serde_json::from_str(text)?;
        let kind = match raw.header.msg_type.as_str() {
            "status" => {
                let content: StatusContent = serde_json::from_value(raw.content)?;
                MessageKind::Status {
                    execution_state: content.execution_state,
                }
            }
            "execute_input" => {
                let content: InputContent = serde_json::from_value(raw.content)?;
                MessageKind::ExecuteInput { code: content.code }
            }
            "execute_reply" => MessageKind::ExecuteReply(serde_json::from_value(raw.content)?),
            "execute_result" => MessageKind::ExecuteResult(serde_json::from_value(raw.content)?),
            "display_data" => MessageKind::DisplayData(serde_json::from_value(raw.content)?),
            "stream" => {
                let content: StreamContent = serde_json::from_value(raw.content)?;
                MessageKind::Stream {
                    name: content.name,
                    text: content.text,
                }
            }
            "error" => {
                let content: ErrorContent = serde_json::from_value(raw.content)?;
                MessageKind::Error {
                    ename: content.ename,
                    evalue: content.evalue,
                }
            }
            other => MessageKind::Unknown {
                msg_type: other.to_owned(),
            },
        };
        Ok(Self {
            msg_id: raw.header.msg_id,
            parent_msg_id: raw.parent_header.msg_id,
            channel: raw.channel,
            kind,
        })
    }
}
