use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::managers::{Credential, ExecutionReply, ToolDescriptor, ToolTransport};

/// In-memory [`ToolTransport`] that answers from queued replies.
///
/// An empty queue answers with an error. `Err(String)` entries become
/// transport failures carrying that message.
#[derive(Default)]
pub struct ScriptedTransport {
    listings: Mutex<VecDeque<Result<Vec<ToolDescriptor>, String>>>,
    executions: Mutex<VecDeque<Result<ExecutionReply, String>>>,
    polls: Mutex<VecDeque<Result<ExecutionReply, String>>>,
    poll_delay: Mutex<Duration>,
    list_calls: AtomicUsize,
    execute_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    credentials: Mutex<Vec<Option<String>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_listing(&self, reply: Result<Vec<ToolDescriptor>, String>) {
        lock(&self.listings).push_back(reply);
    }

    pub fn push_execute(&self, reply: Result<ExecutionReply, String>) {
        lock(&self.executions).push_back(reply);
    }

    pub fn push_poll(&self, reply: Result<ExecutionReply, String>) {
        lock(&self.polls).push_back(reply);
    }

    /// Queue `count` in-progress poll replies for `execution_id`.
    pub fn push_in_progress(&self, execution_id: &str, count: usize) {
        let mut polls = lock(&self.polls);
        for _ in 0..count {
            polls.push_back(Ok(ExecutionReply::in_progress(execution_id)));
        }
    }

    /// Delay every poll reply, to simulate a slow status endpoint.
    pub fn set_poll_delay(&self, delay: Duration) {
        *lock(&self.poll_delay) = delay;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.execute_calls() + self.poll_calls()
    }

    /// Bearer tokens seen, in request order.
    pub fn credentials_seen(&self) -> Vec<Option<String>> {
        lock(&self.credentials).clone()
    }

    fn note_credential(&self, credential: Option<&Credential>) {
        lock(&self.credentials).push(credential.map(|c| c.expose().to_string()));
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn next<T>(queue: &Mutex<VecDeque<Result<T, String>>>, what: &str) -> Result<T> {
    match lock(queue).pop_front() {
        Some(Ok(reply)) => Ok(reply),
        Some(Err(message)) => Err(anyhow!(message)),
        None => Err(anyhow!("no scripted {what} reply left")),
    }
}

#[async_trait]
impl ToolTransport for ScriptedTransport {
    async fn list_tools(
        &self,
        _base_url: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<ToolDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.note_credential(credential);
        next(&self.listings, "listing")
    }

    async fn execute(
        &self,
        _base_url: &str,
        _tool_id: &str,
        _parameters: &Value,
        credential: Option<&Credential>,
    ) -> Result<ExecutionReply> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.note_credential(credential);
        next(&self.executions, "execute")
    }

    async fn poll(
        &self,
        _base_url: &str,
        _tool_id: &str,
        _execution_id: &str,
        credential: Option<&Credential>,
    ) -> Result<ExecutionReply> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.note_credential(credential);
        let delay = *lock(&self.poll_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        next(&self.polls, "poll")
    }
}

/// Minimal descriptor for scripting catalogs.
pub fn descriptor(id: &str) -> ToolDescriptor {
    ToolDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        version: "1.0.0".to_string(),
        parameters: Value::Null,
        returns: Value::Null,
        is_streaming: false,
        auth_required: false,
        rate_limited: false,
    }
}
