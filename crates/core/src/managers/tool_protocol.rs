use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentlink_shared::{ExecutionStatus, Tool};

// ============================================================
// Credentials
// ============================================================

/// Opaque bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(********)")
    }
}

// ============================================================
// Tool-server wire types
// ============================================================

/// One entry of a `GET /tools` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub returns: Value,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default = "default_auth_required")]
    pub auth_required: bool,
    #[serde(default)]
    pub rate_limited: bool,
}

fn default_auth_required() -> bool {
    true
}

impl ToolDescriptor {
    pub fn into_tool(self, server_id: &str) -> Tool {
        Tool {
            id: self.id,
            name: self.name,
            description: self.description,
            version: self.version,
            parameters: self.parameters,
            returns: self.returns,
            is_streaming: self.is_streaming,
            auth_required: self.auth_required,
            rate_limited: self.rate_limited,
            server_id: server_id.to_string(),
        }
    }
}

/// Servers answer `GET /tools` either with a bare array or `{"tools": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ToolListing {
    Bare(Vec<ToolDescriptor>),
    Wrapped { tools: Vec<ToolDescriptor> },
}

impl ToolListing {
    pub fn into_descriptors(self) -> Vec<ToolDescriptor> {
        match self {
            Self::Bare(tools) | Self::Wrapped { tools } => tools,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExecuteRequest<'a> {
    pub parameters: &'a Value,
}

/// Body of an execute or execution-status reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReply {
    /// Missing status reads as `error`.
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionReply {
    pub fn success(result: Value) -> Self {
        Self {
            status: ExecutionStatus::Success,
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn in_progress(execution_id: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::InProgress,
            execution_id: Some(execution_id.into()),
            ..Self::default()
        }
    }
}
