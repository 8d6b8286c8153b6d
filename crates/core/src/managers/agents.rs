use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use agentlink_shared::{AgentInfo, AgentRecord, LinkError, LinkResult, BROADCAST};

/// Live agents of one session, keyed by agent id.
///
/// Only `register`/`unregister` signal failure; lookups answer `None` or an
/// empty list for unknown ids.
#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<String, AgentRecord>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, info: AgentInfo) -> LinkResult<AgentRecord> {
        if info.id.trim().is_empty() {
            return Err(LinkError::ValidationError(
                "Agent ID cannot be empty".to_string(),
            ));
        }
        if info.id == BROADCAST {
            return Err(LinkError::ValidationError(format!(
                "Agent ID '{BROADCAST}' is reserved for broadcast messages"
            )));
        }

        // The entry guard holds the shard lock, so check-and-insert is atomic.
        match self.agents.entry(info.id.clone()) {
            Entry::Occupied(_) => Err(LinkError::DuplicateAgent(info.id)),
            Entry::Vacant(slot) => {
                let record = AgentRecord::from_info(info);
                info!(
                    agent_id = %record.id,
                    name = %record.name,
                    capabilities = ?record.capabilities,
                    "Agent registered"
                );
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub fn unregister(&self, agent_id: &str) -> LinkResult<AgentRecord> {
        match self.agents.remove(agent_id) {
            Some((_, record)) => {
                info!(agent_id = %agent_id, "Agent unregistered");
                Ok(record)
            }
            None => Err(LinkError::AgentNotFound(agent_id.to_string())),
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.get(agent_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Linear scan; callers must not rely on the order of the result.
    pub fn find_by_capability(&self, capability: &str) -> Vec<AgentRecord> {
        let matches: Vec<AgentRecord> = self
            .agents
            .iter()
            .filter(|r| r.has_capability(capability))
            .map(|r| r.value().clone())
            .collect();
        debug!(
            capability = %capability,
            matches = matches.len(),
            "Capability lookup"
        );
        matches
    }

    pub fn list(&self) -> Vec<AgentRecord> {
        self.agents.iter().map(|r| r.value().clone()).collect()
    }

    /// Snapshot of the registered ids at call time.
    pub fn ids(&self) -> Vec<String> {
        self.agents.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
