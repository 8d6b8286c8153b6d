pub mod config;
pub mod managers;
pub mod test_utils;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use agentlink_shared::LinkResult;

use crate::config::{AppConfig, ToolServerConfig};
use crate::managers::{
    AgentRegistry, HttpToolTransport, MessageBus, ThreadTracker, ToolDiscoveryClient,
    ToolExecutionClient, ToolServerRegistry, ToolTransport,
};

pub use agentlink_shared as shared;

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub default_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: managers::DEFAULT_POLL_INTERVAL,
            default_timeout: managers::DEFAULT_TIMEOUT,
        }
    }
}

/// One protocol instance: agents, their messages and threads, and the
/// tool servers they can call.
pub struct Session {
    pub registry: Arc<AgentRegistry>,
    pub threads: Arc<ThreadTracker>,
    pub bus: Arc<MessageBus>,
    pub tool_servers: Arc<ToolServerRegistry>,
    pub discovery: Arc<ToolDiscoveryClient>,
    pub executor: Arc<ToolExecutionClient>,
}

impl Session {
    pub fn new(transport: Arc<dyn ToolTransport>, settings: SessionSettings) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        let threads = Arc::new(ThreadTracker::new());
        let bus = Arc::new(MessageBus::new(registry.clone(), threads.clone()));
        let tool_servers = Arc::new(ToolServerRegistry::new());
        let discovery = Arc::new(ToolDiscoveryClient::new(
            tool_servers.clone(),
            transport.clone(),
        ));
        let executor = Arc::new(
            ToolExecutionClient::new(tool_servers.clone(), transport)
                .with_poll_interval(settings.poll_interval)
                .with_default_timeout(settings.default_timeout),
        );

        Self {
            registry,
            threads,
            bus,
            tool_servers,
            discovery,
            executor,
        }
    }

    /// HTTP-backed session with every configured server registered.
    /// Invalid server entries are logged and skipped.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpToolTransport::new(config.http_timeout())?);
        let session = Self::new(
            transport,
            SessionSettings {
                poll_interval: config.poll_interval(),
                default_timeout: config.tool_timeout(),
            },
        );
        for server in &config.servers {
            if let Err(e) = session.add_server(server.clone()) {
                warn!(url = %server.url, "Skipping tool server: {}", e);
            }
        }
        Ok(session)
    }

    pub fn add_server(&self, config: ToolServerConfig) -> LinkResult<String> {
        self.tool_servers.add_server(config)
    }

    pub fn close(&self) {
        self.bus.shutdown_report();
        info!(
            servers = self.tool_servers.len(),
            tools = self.tool_servers.all_tools().len(),
            "Session closed"
        );
    }
}
