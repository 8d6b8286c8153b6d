use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

mod tool;

pub use tool::{AuthType, ExecutionStatus, Tool, ToolServer};

/// Reserved recipient id meaning "every agent registered at send time".
pub const BROADCAST: &str = "broadcast";

/// Message type used when the sender does not tag a message.
pub const DEFAULT_MESSAGE_TYPE: &str = "request";

/// Identifier for messages and other ephemeral protocol objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(Uuid);

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default generates a random UUID v4, so every default id is unique.
impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

// Serialized as {"type": ..., "detail": ...} so callers can branch on the kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum LinkError {
    #[error("Agent {0} is already registered")]
    DuplicateAgent(String),
    #[error("Agent {0} is not registered")]
    AgentNotFound(String),
    #[error("Sender agent {0} is not registered")]
    UnknownSender(String),
    #[error("Recipient agent {0} is not registered")]
    UnknownRecipient(String),
    #[error("Message {0} was already sent on this bus")]
    DuplicateMessage(String),
    #[error("Unknown tool server ID: {0}")]
    UnknownServer(String),
    #[error("Failed to connect to tool server {server_id}: {cause}")]
    ConnectionFailure { server_id: String, cause: String },
    #[error("Unknown tool ID: {0}")]
    UnknownTool(String),
    #[error("Tool {tool_id} failed: {message}")]
    RemoteExecutionError { tool_id: String, message: String },
    #[error("Tool {tool_id} execution timed out after {elapsed_ms}ms")]
    ExecutionTimeout {
        tool_id: String,
        execution_id: Option<String>,
        elapsed_ms: u64,
    },
    #[error("Tool {tool_id} execution is still in progress ({execution_id})")]
    ExecutionPending {
        tool_id: String,
        execution_id: String,
    },
    #[error("Tool {0} execution was cancelled")]
    Cancelled(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type LinkResult<T> = std::result::Result<T, LinkError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Active,
    Inactive,
}

/// What an agent submits when it joins a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities: BTreeSet::new(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A registered agent as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub capabilities: BTreeSet<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn from_info(info: AgentInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            capabilities: info.capabilities,
            metadata: info.metadata,
            status: AgentStatus::Active,
            registered_at: Utc::now(),
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// A message between agents. Immutable once built; the bus only ever clones it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentMessage {
    /// A new `request` that starts its own thread.
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        MessageDraft::new(sender_id, recipient_id, content).into_message()
    }

    /// A message to every agent registered when it is sent.
    pub fn broadcast(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(sender_id, BROADCAST, content)
    }

    #[must_use]
    pub fn in_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    #[must_use]
    pub fn with_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Build a `response` addressed back to the sender, in the same thread.
    pub fn reply(&self, content: impl Into<String>) -> Self {
        Self::new(&self.recipient_id, &self.sender_id, content)
            .in_thread(&self.thread_id)
            .with_type("response")
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient_id == BROADCAST
    }
}

/// Wire form of an outgoing message: ids, type and timestamp may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDraft {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MessageDraft {
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Fill in generated defaults. A draft without a thread starts its own.
    pub fn into_message(self) -> AgentMessage {
        let message_id = self
            .message_id
            .unwrap_or_else(|| LinkId::new().to_string());
        let thread_id = self.thread_id.unwrap_or_else(|| message_id.clone());
        AgentMessage {
            message_id,
            thread_id,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            content: self.content,
            message_type: self
                .message_type
                .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string()),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            metadata: self.metadata,
        }
    }
}

impl From<MessageDraft> for AgentMessage {
    fn from(draft: MessageDraft) -> Self {
        draft.into_message()
    }
}

/// What `send` hands back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    #[default]
    Active,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub title: String,
    pub participants: BTreeSet<String>,
    pub message_count: u64,
    pub last_activity: DateTime<Utc>,
    pub status: ThreadStatus,
}
