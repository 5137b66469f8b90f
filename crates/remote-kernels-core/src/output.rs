//! Result of one code execution in a kernel.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

/// Outcome of a single code execution.
///
/// Kernel-reported errors are data, not failures: callers read the rendered
/// `ename: evalue` text the same way they read a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutput {
    /// Plain-text result.
    Text { text: String },
    /// Base64-encoded PNG produced by the kernel.
    Image { data: String },
    /// Error reported by the executed code.
    Error { ename: String, evalue: String },
    /// The kernel went idle without producing any output.
    Empty,
}

impl ExecutionOutput {
    /// Create a text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image result from base64-encoded PNG data.
    #[must_use]
    pub fn image(data: impl Into<String>) -> Self {
        Self::Image { data: data.into() }
    }

    /// Whether the kernel reported an error for this execution.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Decode the PNG payload of an image result.
    #[must_use]
    pub fn decode_image(&self) -> Option<Vec<u8>> {
        if let Self::Image { data } = self {
            BASE64.decode(data).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for ExecutionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text } => f.write_str(text),
            Self::Image { data } => f.write_str(data),
            Self::Error { ename, evalue } => write!(f, "{ename}: {evalue}"),
            Self::Empty => Ok(()),
        }
    }
}
