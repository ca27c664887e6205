use async_trait::async_trait;
use serde_json::Value;
use taskfleet_core::TaskParameters;

/// Text recorded on a task when an agent fails without saying why.
pub const DEFAULT_FAILURE_MESSAGE: &str = "agent invocation failed";

/// Failure reported by an agent handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentFailure {
    message: Option<String>,
}

impl AgentFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// A failure with no message; recorded as [`DEFAULT_FAILURE_MESSAGE`].
    pub fn unspecified() -> Self {
        Self::default()
    }

    /// The text recorded on the failed task.
    pub fn message(&self) -> &str {
        match self.message.as_deref() {
            Some(m) if !m.trim().is_empty() => m,
            _ => DEFAULT_FAILURE_MESSAGE,
        }
    }
}

impl std::fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AgentFailure {}

/// A worker capable of executing tasks.
///
/// The orchestrator never looks inside a handle: it passes the task name and
/// parameters and records whatever comes back.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    async fn invoke(&self, task_name: &str, parameters: &TaskParameters)
        -> Result<Value, AgentFailure>;
}

type AgentFn = dyn Fn(&str, &TaskParameters) -> Result<Value, AgentFailure> + Send + Sync;

/// Adapts a synchronous closure into an [`AgentHandle`].
pub struct FnAgent {
    f: Box<AgentFn>,
}

impl FnAgent {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &TaskParameters) -> Result<Value, AgentFailure> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl AgentHandle for FnAgent {
    async fn invoke(
        &self,
        task_name: &str,
        parameters: &TaskParameters,
    ) -> Result<Value, AgentFailure> {
        (self.f)(task_name, parameters)
    }
}
