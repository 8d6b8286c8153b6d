use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use agentlink_shared::{LinkError, LinkResult, Tool};

use super::tool_protocol::Credential;
use super::tool_servers::ToolServerRegistry;
use super::tool_transport::ToolTransport;

/// Fetches tool catalogs and stores them in the server registry.
pub struct ToolDiscoveryClient {
    servers: Arc<ToolServerRegistry>,
    transport: Arc<dyn ToolTransport>,
}

impl ToolDiscoveryClient {
    pub fn new(servers: Arc<ToolServerRegistry>, transport: Arc<dyn ToolTransport>) -> Self {
        Self { servers, transport }
    }

    /// Fetch `server_id`'s catalog and replace the cached one with it.
    ///
    /// Transport failures come back as `ConnectionFailure`; the previous
    /// catalog is left untouched in that case.
    pub async fn discover(
        &self,
        server_id: &str,
        credential: Option<&Credential>,
    ) -> LinkResult<Vec<Tool>> {
        let endpoint = self.servers.endpoint(server_id, credential)?;

        let descriptors = match self
            .transport
            .list_tools(&endpoint.url, endpoint.credential.as_ref())
            .await
        {
            Ok(descriptors) => descriptors,
            Err(e) => {
                let cause = format!("{e:#}");
                warn!(server_id = %server_id, error = %cause, "Tool discovery failed");
                return Err(LinkError::ConnectionFailure {
                    server_id: server_id.to_string(),
                    cause,
                });
            }
        };

        let tools: Vec<Tool> = descriptors
            .into_iter()
            .map(|d| d.into_tool(server_id))
            .collect();
        // The server may have been removed while the request was in flight.
        self.servers.replace_tools(server_id, tools.clone())?;

        info!(server_id = %server_id, tools = tools.len(), "Tool catalog refreshed");
        Ok(tools)
    }

    /// Discover every registered server concurrently, one result per server.
    pub async fn discover_all(&self) -> Vec<(String, LinkResult<Vec<Tool>>)> {
        let ids = self.servers.ids();
        let results = join_all(ids.iter().map(|id| self.discover(id, None))).await;
        ids.into_iter().zip(results).collect()
    }
}
