use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tracing::{debug, info};

use agentlink_shared::{
    AgentInfo, AgentMessage, AgentRecord, LinkError, LinkResult, SendReceipt, ThreadSummary,
    BROADCAST,
};

use super::agents::AgentRegistry;
use super::threads::ThreadTracker;

/// Routes messages between the agents of one registry.
///
/// Every agent has its own unbounded FIFO mailbox. Direct messages land in
/// the recipient's mailbox only; a broadcast is copied into the mailbox of
/// each agent registered at send time.
pub struct MessageBus {
    registry: Arc<AgentRegistry>,
    threads: Arc<ThreadTracker>,
    mailboxes: DashMap<String, VecDeque<AgentMessage>>,
    sent_ids: DashSet<String>,
}

impl MessageBus {
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>, threads: Arc<ThreadTracker>) -> Self {
        Self {
            registry,
            threads,
            mailboxes: DashMap::new(),
            sent_ids: DashSet::new(),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn threads(&self) -> &ThreadTracker {
        &self.threads
    }

    /// Register the agent and open its mailbox.
    ///
    /// A mailbox left behind by an agent that was unregistered directly on
    /// the registry is discarded first, so the new agent starts empty.
    pub fn register_agent(&self, info: AgentInfo) -> LinkResult<AgentRecord> {
        if let Some((agent_id, stale)) = self
            .mailboxes
            .remove_if(&info.id, |id, _| !self.registry.contains(id))
        {
            if !stale.is_empty() {
                debug!(
                    agent_id = %agent_id,
                    dropped = stale.len(),
                    "Discarded messages of a previous registration"
                );
            }
        }
        let record = self.registry.register(info)?;
        // A message routed since `register` returned already created the
        // mailbox; keep it rather than clobbering it.
        self.mailboxes.entry(record.id.clone()).or_default();
        Ok(record)
    }

    /// Unregister the agent and discard whatever it never received.
    pub fn unregister_agent(&self, agent_id: &str) -> LinkResult<AgentRecord> {
        let record = self.registry.unregister(agent_id)?;
        if let Some((_, dropped)) = self.mailboxes.remove(agent_id) {
            if !dropped.is_empty() {
                debug!(
                    agent_id = %agent_id,
                    dropped = dropped.len(),
                    "Discarded undelivered messages"
                );
            }
        }
        Ok(record)
    }

    /// Validate addressing, deliver, and record the message in its thread.
    ///
    /// Addressing problems come back as `Err` values for the caller to
    /// branch on.
    pub fn send(&self, message: impl Into<AgentMessage>) -> LinkResult<SendReceipt> {
        let message = message.into();

        if !self.registry.contains(&message.sender_id) {
            return Err(LinkError::UnknownSender(message.sender_id));
        }
        let recipients = if message.recipient_id == BROADCAST {
            self.registry.ids()
        } else if self.registry.contains(&message.recipient_id) {
            vec![message.recipient_id.clone()]
        } else {
            return Err(LinkError::UnknownRecipient(message.recipient_id));
        };
        if !self.sent_ids.insert(message.message_id.clone()) {
            return Err(LinkError::DuplicateMessage(message.message_id));
        }

        for recipient in &recipients {
            if let Some(mut queue) = self.mailboxes.get_mut(recipient) {
                queue.push_back(message.clone());
            } else if self.registry.contains(recipient) {
                self.mailboxes
                    .entry(recipient.clone())
                    .or_default()
                    .push_back(message.clone());
            }
        }
        self.threads.record(&message);

        debug!(
            message_id = %message.message_id,
            thread_id = %message.thread_id,
            sender = %message.sender_id,
            recipient = %message.recipient_id,
            delivered = recipients.len(),
            "Message routed"
        );

        Ok(SendReceipt {
            message_id: message.message_id,
            thread_id: message.thread_id,
        })
    }

    /// Drain everything queued for `agent_id`, oldest first. Never waits;
    /// unknown agents get an empty list.
    pub fn receive(&self, agent_id: &str) -> Vec<AgentMessage> {
        if !self.registry.contains(agent_id) {
            return Vec::new();
        }
        self.mailboxes
            .get_mut(agent_id)
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Number of messages waiting for `agent_id`, without draining.
    pub fn pending(&self, agent_id: &str) -> usize {
        self.mailboxes.get(agent_id).map_or(0, |queue| queue.len())
    }

    pub fn find_by_capability(&self, capability: &str) -> Vec<AgentRecord> {
        self.registry.find_by_capability(capability)
    }

    pub fn get_thread_history(&self, thread_id: &str) -> Vec<AgentMessage> {
        self.threads.get_thread_history(thread_id)
    }

    pub fn get_all_threads(&self) -> Vec<ThreadSummary> {
        self.threads.get_all_threads()
    }

    pub fn shutdown_report(&self) {
        let undelivered: usize = self.mailboxes.iter().map(|q| q.len()).sum();
        info!(
            agents = self.registry.len(),
            threads = self.threads.len(),
            undelivered = undelivered,
            "Message bus closing"
        );
    }
}
