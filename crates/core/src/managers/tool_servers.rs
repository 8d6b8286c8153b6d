use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use agentlink_shared::{AuthType, LinkError, LinkResult, Tool, ToolServer};

use super::tool_protocol::Credential;
use crate::config::ToolServerConfig;
use crate::validation::validate_request;

/// Configured secrets for one server. Never serialized.
#[derive(Debug, Clone, Default)]
struct ServerSecrets {
    api_key: Option<Credential>,
    client_id: Option<String>,
    client_secret: Option<Credential>,
}

impl ServerSecrets {
    fn from_config(config: &ToolServerConfig) -> Self {
        Self {
            api_key: config.api_key.clone().map(Credential::bearer),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone().map(Credential::bearer),
        }
    }

    fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.client_id.is_none() && self.client_secret.is_none()
    }
}

struct ServerEntry {
    server: ToolServer,
    secrets: ServerSecrets,
}

/// Credential-free view of a registered server.
#[derive(Debug, Clone, Serialize)]
pub struct ToolServerInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: String,
    pub auth_type: AuthType,
    pub tool_count: usize,
    pub has_credential: bool,
}

/// Where a request for one server goes.
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    pub server_id: String,
    pub url: String,
    pub credential: Option<Credential>,
}

/// Configured tool servers and their most recently discovered catalogs.
///
/// Every method takes the lock for the duration of one call only, so
/// callers never hold it across an `.await`.
#[derive(Default)]
pub struct ToolServerRegistry {
    servers: RwLock<HashMap<String, ServerEntry>>,
}

impl ToolServerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Every write is a single map operation, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ServerEntry>> {
        self.servers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ServerEntry>> {
        self.servers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and store a server with an empty catalog. Re-adding an id
    /// overwrites the previous entry.
    pub fn add_server(&self, config: ToolServerConfig) -> LinkResult<String> {
        validate_request(&config).map_err(LinkError::ValidationError)?;

        let url = config.url.trim().trim_end_matches('/').to_string();
        let id = config.id.clone().unwrap_or_else(|| derive_server_id(&url));
        let secrets = ServerSecrets::from_config(&config);

        let mut servers = self.write();
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("Tool Server {}", servers.len() + 1));
        let server = ToolServer {
            id: id.clone(),
            name,
            url,
            description: config.description.clone(),
            auth_type: config.auth_type,
            tools: Vec::new(),
        };
        info!(
            server_id = %id,
            name = %server.name,
            url = %server.url,
            auth_type = %server.auth_type,
            "Tool server added"
        );
        if servers.insert(id.clone(), ServerEntry { server, secrets }).is_some() {
            debug!(server_id = %id, "Replaced existing tool server entry");
        }
        Ok(id)
    }

    /// Returns whether the id was present.
    pub fn remove_server(&self, server_id: &str) -> bool {
        let removed = self.write().remove(server_id).is_some();
        if removed {
            info!(server_id = %server_id, "Tool server removed");
        }
        removed
    }

    pub fn contains(&self, server_id: &str) -> bool {
        self.read().contains_key(server_id)
    }

    pub fn get(&self, server_id: &str) -> Option<ToolServer> {
        self.read().get(server_id).map(|e| e.server.clone())
    }

    pub fn list(&self) -> Vec<ToolServer> {
        self.read().values().map(|e| e.server.clone()).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn list_info(&self) -> Vec<ToolServerInfo> {
        self.read()
            .values()
            .map(|e| ToolServerInfo {
                id: e.server.id.clone(),
                name: e.server.name.clone(),
                url: e.server.url.clone(),
                description: e.server.description.clone(),
                auth_type: e.server.auth_type,
                tool_count: e.server.tools.len(),
                has_credential: !e.secrets.is_empty(),
            })
            .collect()
    }

    /// Target URL and bearer credential for a request. An explicit
    /// credential wins over the configured api key; OAuth client
    /// credentials are never sent.
    pub fn endpoint(
        &self,
        server_id: &str,
        explicit: Option<&Credential>,
    ) -> LinkResult<ServerEndpoint> {
        let servers = self.read();
        let entry = servers
            .get(server_id)
            .ok_or_else(|| LinkError::UnknownServer(server_id.to_string()))?;
        let credential = explicit.cloned().or_else(|| entry.secrets.api_key.clone());
        Ok(ServerEndpoint {
            server_id: entry.server.id.clone(),
            url: entry.server.url.clone(),
            credential,
        })
    }

    /// Replace the cached catalog wholesale.
    pub fn replace_tools(&self, server_id: &str, tools: Vec<Tool>) -> LinkResult<()> {
        let mut servers = self.write();
        let entry = servers
            .get_mut(server_id)
            .ok_or_else(|| LinkError::UnknownServer(server_id.to_string()))?;
        entry.server.tools = tools;
        Ok(())
    }

    /// Id of the first server whose current catalog lists `tool_id`.
    pub fn resolve_tool(&self, tool_id: &str) -> Option<String> {
        self.read()
            .values()
            .find(|e| e.server.tools.iter().any(|t| t.id == tool_id))
            .map(|e| e.server.id.clone())
    }

    pub fn find_tool(&self, tool_id: &str) -> Option<Tool> {
        self.read()
            .values()
            .flat_map(|e| e.server.tools.iter())
            .find(|t| t.id == tool_id)
            .cloned()
    }

    pub fn all_tools(&self) -> Vec<Tool> {
        self.read()
            .values()
            .flat_map(|e| e.server.tools.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Stable id for a server URL: `srv-` plus the first 16 hex digits of the
/// SHA-256 of the trimmed URL.
pub fn derive_server_id(url: &str) -> String {
    let normalized = url.trim().trim_end_matches('/');
    let digest = Sha256::digest(normalized.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("srv-{hex}")
}
