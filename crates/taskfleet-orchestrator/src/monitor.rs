use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use taskfleet_core::TaskId;
use tokio::sync::RwLock;

/// Metrics tracked per agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub invocations: u32,
    pub failures: u32,
    pub duration_ms: u64,
}

/// What an agent worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Working,
    Error,
}

/// Real-time snapshot of an agent worker's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    /// Tasks currently executing on this agent, in start order.
    pub current_tasks: Vec<TaskId>,
    pub status: WorkerStatus,
    pub metrics: AgentMetrics,
}

impl AgentState {
    fn idle(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            current_tasks: Vec::new(),
            status: WorkerStatus::Idle,
            metrics: AgentMetrics::default(),
        }
    }

    /// Drop `task_id` from the in-flight set. The agent leaves `Working`
    /// only when nothing else is still running on it.
    fn settle(&mut self, task_id: &TaskId, outcome: WorkerStatus, duration_ms: u64) {
        self.current_tasks.retain(|t| t != task_id);
        self.metrics.duration_ms += duration_ms;
        if self.current_tasks.is_empty() {
            self.status = outcome;
        }
    }
}

/// Tracks state and metrics for every registered agent.
pub struct AgentMonitor {
    states: Arc<RwLock<HashMap<String, AgentState>>>,
}

impl AgentMonitor {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start tracking an agent. Existing metrics are kept on re-registration.
    pub async fn track(&self, agent_id: &str) {
        let mut states = self.states.write().await;
        states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState::idle(agent_id));
    }

    /// Mark an agent as working on a task.
    pub async fn start_task(&self, agent_id: &str, task_id: &TaskId) {
        let mut states = self.states.write().await;
        let state = states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState::idle(agent_id));
        state.current_tasks.push(task_id.clone());
        state.status = WorkerStatus::Working;
        state.metrics.invocations += 1;
    }

    /// Record a successful invocation of `task_id`.
    pub async fn finish_task(&self, agent_id: &str, task_id: &TaskId, duration_ms: u64) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(agent_id) {
            state.settle(task_id, WorkerStatus::Idle, duration_ms);
        }
    }

    /// Record a failed invocation of `task_id`.
    pub async fn record_failure(&self, agent_id: &str, task_id: &TaskId, duration_ms: u64) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(agent_id) {
            state.metrics.failures += 1;
            state.settle(task_id, WorkerStatus::Error, duration_ms);
        }
    }

    /// Get a snapshot of all agent states, sorted by agent id.
    pub async fn snapshot(&self) -> Vec<AgentState> {
        let states = self.states.read().await;
        let mut all: Vec<AgentState> = states.values().cloned().collect();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        all
    }

    /// Get the state of a specific agent.
    pub async fn get_state(&self, agent_id: &str) -> Option<AgentState> {
        let states = self.states.read().await;
        states.get(agent_id).cloned()
    }

    /// Get aggregate metrics across all agents.
    pub async fn aggregate_metrics(&self) -> AgentMetrics {
        let states = self.states.read().await;
        let mut total = AgentMetrics::default();
        for state in states.values() {
            total.invocations += state.metrics.invocations;
            total.failures += state.metrics.failures;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    /// Serialize the current state as JSON.
    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "agents": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}
