use std::collections::BTreeSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use agentlink_shared::{AgentMessage, ThreadStatus, ThreadSummary, BROADCAST};

/// Longest title, in characters, taken from a thread's first line.
pub const TITLE_MAX_CHARS: usize = 50;
const TITLE_ELLIPSIS: &str = "...";

struct ThreadLog {
    summary: ThreadSummary,
    messages: Vec<AgentMessage>,
}

/// Summaries and history of every thread seen on one bus.
///
/// Each thread lives in its own map entry; the summary update and the
/// history append happen under that entry's lock.
#[derive(Default)]
pub struct ThreadTracker {
    threads: DashMap<String, ThreadLog>,
}

impl ThreadTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the bus calls this, after a message passed addressing checks.
    pub(crate) fn record(&self, message: &AgentMessage) {
        match self.threads.entry(message.thread_id.clone()) {
            Entry::Occupied(mut slot) => {
                let log = slot.get_mut();
                log.summary.message_count += 1;
                // Caller-supplied timestamps may be older than what is recorded.
                log.summary.last_activity = log.summary.last_activity.max(message.timestamp);
                add_participants(&mut log.summary.participants, message);
                log.messages.push(message.clone());
                debug!(
                    thread_id = %message.thread_id,
                    message_count = log.summary.message_count,
                    "Thread updated"
                );
            }
            Entry::Vacant(slot) => {
                let mut participants = BTreeSet::new();
                add_participants(&mut participants, message);
                let summary = ThreadSummary {
                    thread_id: message.thread_id.clone(),
                    title: derive_title(&message.content),
                    participants,
                    message_count: 1,
                    last_activity: message.timestamp,
                    status: ThreadStatus::Active,
                };
                debug!(thread_id = %summary.thread_id, title = %summary.title, "Thread started");
                slot.insert(ThreadLog {
                    summary,
                    messages: vec![message.clone()],
                });
            }
        }
    }

    /// Every summary, most recently active first.
    pub fn get_all_threads(&self) -> Vec<ThreadSummary> {
        let mut summaries: Vec<ThreadSummary> =
            self.threads.iter().map(|t| t.summary.clone()).collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        summaries
    }

    pub fn get_thread(&self, thread_id: &str) -> Option<ThreadSummary> {
        self.threads.get(thread_id).map(|t| t.summary.clone())
    }

    /// Messages of a thread in send order; empty for unknown threads.
    pub fn get_thread_history(&self, thread_id: &str) -> Vec<AgentMessage> {
        self.threads
            .get(thread_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }

    /// Returns false when the thread is unknown.
    pub fn set_status(&self, thread_id: &str, status: ThreadStatus) -> bool {
        match self.threads.get_mut(thread_id) {
            Some(mut log) => {
                log.summary.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

fn add_participants(participants: &mut BTreeSet<String>, message: &AgentMessage) {
    participants.insert(message.sender_id.clone());
    if message.recipient_id != BROADCAST {
        participants.insert(message.recipient_id.clone());
    }
}

/// First line of `content`, cut to [`TITLE_MAX_CHARS`] characters.
/// The ellipsis is appended only when something was actually cut.
pub fn derive_title(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or_default();
    let mut chars = first_line.chars();
    let title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{title}{TITLE_ELLIPSIS}")
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_uses_first_line() {
        assert_eq!(derive_title("Can you help?\nDetails..."), "Can you help?");
        assert_eq!(derive_title(""), "");
        assert_eq!(derive_title("single"), "single");
    }

    #[test]
    fn test_title_truncation_boundaries() {
        let exact = "x".repeat(50);
        assert_eq!(derive_title(&exact), exact);

        let long = "y".repeat(55);
        let title = derive_title(&long);
        assert_eq!(title, format!("{}...", "y".repeat(50)));
    }

    #[test]
    fn test_title_counts_characters_not_bytes() {
        let line = "é".repeat(50);
        assert_eq!(derive_title(&line), line);
        assert!(derive_title(&"é".repeat(51)).ends_with("..."));
    }

    #[test]
    fn test_backdated_message_does_not_rewind_activity() {
        let tracker = ThreadTracker::new();
        let first = AgentMessage::new("a", "b", "Kickoff");
        tracker.record(&first);

        let mut backdated = first.reply("late report");
        backdated.timestamp = first.timestamp - std::time::Duration::from_secs(3600);
        tracker.record(&backdated);

        let summary = tracker.get_thread(&first.thread_id).unwrap();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.last_activity, first.timestamp);
        assert_eq!(tracker.get_thread_history(&first.thread_id).len(), 2);
    }

    #[test]
    fn test_record_creates_then_updates() {
        let tracker = ThreadTracker::new();
        let first = AgentMessage::new("a", "b", "Kickoff\nmore");
        tracker.record(&first);

        let reply = first.reply("ack");
        tracker.record(&reply);

        let follow = AgentMessage::new("c", "a", "joining").in_thread(&first.thread_id);
        tracker.record(&follow);

        let summary = tracker.get_thread(&first.thread_id).unwrap();
        assert_eq!(summary.title, "Kickoff");
        assert_eq!(summary.message_count, 3);
        assert_eq!(summary.last_activity, follow.timestamp);
        assert_eq!(
            summary.participants,
            BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(tracker.get_thread_history(&first.thread_id).len(), 3);
    }

    #[test]
    fn test_broadcast_is_never_a_participant() {
        let tracker = ThreadTracker::new();
        let msg = AgentMessage::broadcast("a", "hello all");
        tracker.record(&msg);
        tracker.record(&AgentMessage::broadcast("b", "hi").in_thread(&msg.thread_id));

        let summary = tracker.get_thread(&msg.thread_id).unwrap();
        assert_eq!(
            summary.participants,
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_unknown_thread_is_empty_not_error() {
        let tracker = ThreadTracker::new();
        assert!(tracker.get_thread_history("nope").is_empty());
        assert!(tracker.get_thread("nope").is_none());
        assert!(!tracker.set_status("nope", ThreadStatus::Resolved));
    }

    #[test]
    fn test_status_is_caller_driven() {
        let tracker = ThreadTracker::new();
        let msg = AgentMessage::new("a", "b", "done?");
        tracker.record(&msg);
        assert_eq!(
            tracker.get_thread(&msg.thread_id).unwrap().status,
            ThreadStatus::Active
        );

        assert!(tracker.set_status(&msg.thread_id, ThreadStatus::Resolved));
        tracker.record(&msg.reply("yes"));
        assert_eq!(
            tracker.get_thread(&msg.thread_id).unwrap().status,
            ThreadStatus::Resolved
        );
    }
}
