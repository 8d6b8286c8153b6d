use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use agentlink_shared::{ExecutionStatus, LinkError, LinkResult};

use super::tool_protocol::{Credential, ExecutionReply};
use super::tool_servers::{ServerEndpoint, ToolServerRegistry};
use super::tool_transport::ToolTransport;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================
// Cancellation
// ============================================================

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation flag shared between a caller and a running
/// execution. `cancel()` is idempotent.
#[derive(Clone, Default)]
pub struct CancelSignal {
    state: Arc<CancelState>,
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            self.state.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called.
    pub async fn cancelled(&self) {
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ============================================================
// Options and results
// ============================================================

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Overrides the server's configured api key.
    pub credential: Option<Credential>,
    /// When false an asynchronous execution is returned as `Pending`.
    pub wait: bool,
    /// `None` uses the client's configured default.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelSignal>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            credential: None,
            wait: true,
            timeout: None,
            cancel: None,
        }
    }
}

impl ExecuteOptions {
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    #[must_use]
    pub fn no_wait(mut self) -> Self {
        self.wait = false;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success(Value),
    /// The remote error string, or a description of the transport failure.
    Error(String),
    /// Still running remotely; only produced when the caller did not wait.
    Pending,
    TimedOut(Duration),
    Cancelled,
}

/// Final state of one `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecution {
    pub tool_id: String,
    pub server_id: String,
    /// Present only for asynchronous completions.
    pub execution_id: Option<String>,
    /// Number of status requests issued.
    pub polls: u32,
    pub outcome: ExecutionOutcome,
}

impl ToolExecution {
    fn new(tool_id: &str, server_id: &str) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            server_id: server_id.to_string(),
            execution_id: None,
            polls: 0,
            outcome: ExecutionOutcome::Pending,
        }
    }

    /// Wire status; timeouts and cancellations report `error`.
    pub fn status(&self) -> ExecutionStatus {
        match self.outcome {
            ExecutionOutcome::Success(_) => ExecutionStatus::Success,
            ExecutionOutcome::Pending => ExecutionStatus::InProgress,
            ExecutionOutcome::Error(_)
            | ExecutionOutcome::TimedOut(_)
            | ExecutionOutcome::Cancelled => ExecutionStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Success(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ExecutionOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.outcome {
            ExecutionOutcome::Error(message) => Some(message.clone()),
            ExecutionOutcome::TimedOut(after) => Some(format!(
                "execution timed out after {}s",
                after.as_secs_f64()
            )),
            ExecutionOutcome::Cancelled => Some("execution cancelled".to_string()),
            ExecutionOutcome::Success(_) | ExecutionOutcome::Pending => None,
        }
    }

    pub fn into_result(self) -> LinkResult<Value> {
        match self.outcome {
            ExecutionOutcome::Success(value) => Ok(value),
            ExecutionOutcome::Error(message) => Err(LinkError::RemoteExecutionError {
                tool_id: self.tool_id,
                message,
            }),
            ExecutionOutcome::TimedOut(after) => Err(LinkError::ExecutionTimeout {
                tool_id: self.tool_id,
                execution_id: self.execution_id,
                elapsed_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
            }),
            ExecutionOutcome::Cancelled => Err(LinkError::Cancelled(self.tool_id)),
            ExecutionOutcome::Pending => Err(LinkError::ExecutionPending {
                tool_id: self.tool_id,
                execution_id: self.execution_id.unwrap_or_default(),
            }),
        }
    }

    fn finish(mut self, outcome: ExecutionOutcome) -> Self {
        match &outcome {
            ExecutionOutcome::Error(message) => warn!(
                tool_id = %self.tool_id,
                server_id = %self.server_id,
                error = %message,
                "Tool execution failed"
            ),
            ExecutionOutcome::TimedOut(after) => warn!(
                tool_id = %self.tool_id,
                execution_id = ?self.execution_id,
                polls = self.polls,
                "Tool execution timed out after {:?}",
                after
            ),
            ExecutionOutcome::Cancelled => info!(tool_id = %self.tool_id, "Tool execution cancelled"),
            ExecutionOutcome::Success(_) | ExecutionOutcome::Pending => debug!(
                tool_id = %self.tool_id,
                polls = self.polls,
                "Tool execution returned"
            ),
        }
        self.outcome = outcome;
        self
    }
}

enum Step {
    Done(ExecutionOutcome),
    InProgress(String),
}

fn classify(reply: ExecutionReply) -> Step {
    match reply.status {
        ExecutionStatus::Success => Step::Done(ExecutionOutcome::Success(
            reply.result.unwrap_or(Value::Null),
        )),
        ExecutionStatus::Error => Step::Done(ExecutionOutcome::Error(
            reply
                .error
                .unwrap_or_else(|| "tool server reported an error without a message".to_string()),
        )),
        ExecutionStatus::InProgress => match reply.execution_id {
            Some(id) => Step::InProgress(id),
            None => Step::Done(ExecutionOutcome::Error(
                "tool server reported in_progress without an execution_id".to_string(),
            )),
        },
    }
}

// ============================================================
// Client
// ============================================================

/// Dispatches tool executions and drives asynchronous ones to completion.
///
/// Polling runs inside the caller's future; dropping that future abandons
/// the execution without leaving anything running.
pub struct ToolExecutionClient {
    servers: Arc<ToolServerRegistry>,
    transport: Arc<dyn ToolTransport>,
    poll_interval: Duration,
    default_timeout: Duration,
}

impl ToolExecutionClient {
    pub fn new(servers: Arc<ToolServerRegistry>, transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            servers,
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `tool_id` on whichever server's cached catalog lists it.
    ///
    /// Fails only with `UnknownTool`, before any request is made. Every
    /// other failure is reported through the returned [`ToolExecution`].
    pub async fn execute(
        &self,
        tool_id: &str,
        parameters: Value,
        options: ExecuteOptions,
    ) -> LinkResult<ToolExecution> {
        let unknown = || LinkError::UnknownTool(tool_id.to_string());
        let server_id = self.servers.resolve_tool(tool_id).ok_or_else(unknown)?;
        // Removed between resolution and lookup.
        let endpoint = self
            .servers
            .endpoint(&server_id, options.credential.as_ref())
            .map_err(|_| unknown())?;

        let execution = ToolExecution::new(tool_id, &server_id);
        let cancel = options.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Ok(execution.finish(ExecutionOutcome::Cancelled));
        }

        debug!(tool_id = %tool_id, server_id = %server_id, "Dispatching tool execution");
        let dispatched = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Ok(execution.finish(ExecutionOutcome::Cancelled));
            }
            reply = self.transport.execute(
                &endpoint.url,
                tool_id,
                &parameters,
                endpoint.credential.as_ref(),
            ) => reply,
        };
        let reply = match dispatched {
            Ok(reply) => reply,
            Err(e) => {
                return Ok(execution.finish(ExecutionOutcome::Error(format!(
                    "failed to reach tool server: {e:#}"
                ))));
            }
        };

        match classify(reply) {
            Step::Done(outcome) => Ok(execution.finish(outcome)),
            Step::InProgress(execution_id) => {
                let mut execution = execution;
                execution.execution_id = Some(execution_id.clone());
                if !options.wait {
                    return Ok(execution.finish(ExecutionOutcome::Pending));
                }
                let timeout = options.timeout.unwrap_or(self.default_timeout);
                Ok(self
                    .poll_to_completion(execution, &endpoint, &execution_id, timeout, &cancel)
                    .await)
            }
        }
    }

    /// Polls at `start + k * interval`. A poll instant past the deadline,
    /// or a poll still outstanding at the deadline, ends in `TimedOut`.
    /// A timeout too large to represent as an instant means no deadline.
    async fn poll_to_completion(
        &self,
        mut execution: ToolExecution,
        endpoint: &ServerEndpoint,
        execution_id: &str,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> ToolExecution {
        let start = Instant::now();
        let deadline = start.checked_add(timeout);
        let timed_out = ExecutionOutcome::TimedOut(timeout);

        for k in 1u32.. {
            let next = self
                .poll_interval
                .checked_mul(k)
                .and_then(|offset| start.checked_add(offset));
            let next = match (next, deadline) {
                (Some(next), Some(deadline)) if next <= deadline => next,
                (Some(next), None) => next,
                _ => {
                    return tokio::select! {
                        biased;
                        () = cancel.cancelled() => execution.finish(ExecutionOutcome::Cancelled),
                        () = wait_until(deadline) => execution.finish(timed_out),
                    };
                }
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => return execution.finish(ExecutionOutcome::Cancelled),
                () = sleep_until(next) => {}
            }

            execution.polls += 1;
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => return execution.finish(ExecutionOutcome::Cancelled),
                reply = self.transport.poll(
                    &endpoint.url,
                    &execution.tool_id,
                    execution_id,
                    endpoint.credential.as_ref(),
                ) => reply,
                () = wait_until(deadline) => return execution.finish(timed_out),
            };

            match polled.map(classify) {
                Ok(Step::Done(outcome)) => return execution.finish(outcome),
                Ok(Step::InProgress(_)) => {
                    debug!(
                        tool_id = %execution.tool_id,
                        execution_id = %execution_id,
                        poll = k,
                        "Execution still in progress"
                    );
                }
                Err(e) => {
                    return execution.finish(ExecutionOutcome::Error(format!(
                        "failed to check execution status: {e:#}"
                    )));
                }
            }
        }
        execution.finish(timed_out)
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
