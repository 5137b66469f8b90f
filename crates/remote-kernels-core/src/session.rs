//! Durable session state binding a conversation to its kernel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error returned when parsing a malformed session key.
#[derive(Debug, Error)]
#[error("invalid session key (expected `principal:conversation`): {0:?}")]
pub struct InvalidSessionKey(String);

/// Composite key identifying one conversation's execution path.
///
/// Rendered as `principal:conversation`. Keys are never reused across
/// conversations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    principal: String,
    conversation: String,
}

impl SessionKey {
    /// Create a key from its parts.
    #[must_use]
    pub fn new(principal: impl Into<String>, conversation: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            conversation: conversation.into(),
        }
    }

    /// Owning user identifier.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Conversation identifier.
    #[must_use]
    pub fn conversation(&self) -> &str {
        &self.conversation
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.principal, self.conversation)
    }
}

impl FromStr for SessionKey {
    type Err = InvalidSessionKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (principal, conversation) = s
            .split_once(':')
            .ok_or_else(|| InvalidSessionKey(s.to_owned()))?;
        if principal.is_empty() || conversation.is_empty() {
            return Err(InvalidSessionKey(s.to_owned()));
        }
        Ok(Self::new(principal, conversation))
    }
}

/// Session state for one conversation.
///
/// `kernel_id` tracks the last kernel bound to this session. The kernel may
/// be culled by the gateway at any time; when that happens the manager
/// provisions a replacement and overwrites the id. The manager is the only
/// writer of this field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Owning user identifier.
    pub principal: String,
    /// Conversation identifier.
    pub conversation: String,
    /// Id of the last kernel bound to this session, if any.
    pub kernel_id: Option<Uuid>,
}

impl Session {
    /// Create a fresh session with no kernel bound yet.
    #[must_use]
    pub fn new(key: &SessionKey) -> Self {
        Self {
            principal: key.principal().to_owned(),
            conversation: key.conversation().to_owned(),
            kernel_id: None,
        }
    }

    /// Storage key for this session.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.principal, &self.conversation)
    }
}
