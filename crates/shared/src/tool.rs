//! Tool-server catalog types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    ApiKey,
    #[serde(rename = "oauth")]
    OAuth,
    None,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ApiKey => "api_key",
            Self::OAuth => "oauth",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api_key" => Ok(Self::ApiKey),
            "oauth" => Ok(Self::OAuth),
            "none" => Ok(Self::None),
            other => Err(format!(
                "unknown auth_type '{other}' (expected api_key, oauth or none)"
            )),
        }
    }
}

/// A tool as advertised by its server, stamped with the server it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub parameters: Value,
    pub returns: Value,
    pub is_streaming: bool,
    pub auth_required: bool,
    pub rate_limited: bool,
    /// Lookup-only back-reference; the server may since have been removed.
    pub server_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolServer {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: String,
    pub auth_type: AuthType,
    /// Catalog from the most recent successful discovery.
    pub tools: Vec<Tool>,
}

/// Execution status as reported by a tool server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    InProgress,
    Success,
    #[default]
    Error,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_type_wire_names() {
        assert_eq!(serde_json::to_value(AuthType::ApiKey).unwrap(), "api_key");
        assert_eq!(serde_json::to_value(AuthType::OAuth).unwrap(), "oauth");
        assert_eq!(serde_json::to_value(AuthType::None).unwrap(), "none");
        assert_eq!("OAuth".parse::<AuthType>().unwrap(), AuthType::OAuth);
        assert!("basic".parse::<AuthType>().is_err());
    }

    #[test]
    fn test_execution_status_wire_names() {
        let status: ExecutionStatus = serde_json::from_value("in_progress".into()).unwrap();
        assert_eq!(status, ExecutionStatus::InProgress);
        assert!(!status.is_terminal());
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Error.is_terminal());
    }
}
