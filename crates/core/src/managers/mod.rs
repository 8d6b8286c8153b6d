mod agents;
mod bus;
mod discovery;
mod execution;
mod threads;
pub mod tool_protocol;
mod tool_servers;
pub mod tool_transport;

pub use agents::AgentRegistry;
pub use bus::MessageBus;
pub use discovery::ToolDiscoveryClient;
pub use execution::{
    CancelSignal, ExecuteOptions, ExecutionOutcome, ToolExecution, ToolExecutionClient,
    DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT,
};
pub use threads::{derive_title, ThreadTracker, TITLE_MAX_CHARS};
pub use tool_protocol::{Credential, ExecutionReply, ToolDescriptor, ToolListing};
pub use tool_servers::{derive_server_id, ServerEndpoint, ToolServerInfo, ToolServerRegistry};
pub use tool_transport::{HttpToolTransport, ToolTransport};
